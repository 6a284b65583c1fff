//! Building kind-specific creation requests, prerequisites included.

use chrono::Utc;
use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;

use super::{FixtureProvisioner, FixtureRequest, ProvisioningFailure};
use crate::types::{
    Capabilities, CreateRequest, ImageCapture, KeypairCreate, NetworkCreate, Requirement,
    ResourceKind, ResourceRecord, SnapshotCreate, StaticIpRequest, VmLaunch, VmState,
    VolumeCreate, STATEFUL, STATELESS,
};
use crate::{CreateResource, ResourceAction};

/// CIDR of networks created for fixtures.
const NETWORK_CIDR: &str = "192.168.1.0/24";

/// Length of the random part of generated passwords.
const PASSWORD_LEN: usize = 16;

type Failure<P> = ProvisioningFailure<<P as crate::CloudProvider>::CustomError>;

impl<P> FixtureProvisioner<P>
where
    P: CreateResource + ResourceAction,
{
    /// Creates the resource for `label` and returns its record.
    pub(super) async fn create(
        &self,
        kind: ResourceKind,
        label: &str,
        location: Option<&str>,
    ) -> Result<ResourceRecord, Failure<P>> {
        let request = match kind {
            ResourceKind::Vm => self.vm_request(label, location).await?,
            ResourceKind::Image => self.image_request(label, location).await?,
            ResourceKind::Volume => self.volume_request(label, location).await?,
            ResourceKind::Snapshot => self.snapshot_request(label, location).await?,
            ResourceKind::Network => CreateRequest::Network(NetworkCreate {
                name: self.resource_name(kind),
                data_center: self.data_center(kind, label, location).await?,
                cidr: NETWORK_CIDR.to_string(),
            }),
            ResourceKind::Keypair => CreateRequest::Keypair(KeypairCreate {
                name: self.resource_name(kind),
            }),
            ResourceKind::StaticIp => CreateRequest::StaticIp(StaticIpRequest {
                name: self.resource_name(kind),
                data_center: self.data_center(kind, label, location).await?,
            }),
        };

        log::info!("provisioning {kind} '{label}' as {}", request.name());
        let id = self
            .provider
            .create(&request)
            .await
            .map_err(|source| ProvisioningFailure::Provider {
                kind,
                label: label.to_string(),
                source,
            })?;
        log::info!("provisioned {kind} '{label}': {id}");

        Ok(ResourceRecord {
            kind,
            label: label.to_string(),
            provider_id: id,
            pool_origin: false,
        })
    }

    async fn vm_request(
        &self,
        label: &str,
        location: Option<&str>,
    ) -> Result<CreateRequest, Failure<P>> {
        let kind = ResourceKind::Vm;
        let capabilities = self.required_capabilities(kind, label).await?;
        let data_center = self.data_center(kind, label, location).await?;

        let image = self
            .defaults
            .image(&self.provider, &capabilities)
            .await
            .ok_or_else(|| no_default(kind, label, "image"))?;
        let product_id = self
            .defaults
            .product(&self.provider, image.architecture)
            .await
            .ok_or_else(|| no_default(kind, label, "product"))?;

        let compute = capabilities.compute;
        let network_id = self
            .prerequisite(kind, label, ResourceKind::Network, compute.vlan, &data_center)
            .await?;
        let static_ip_id = self
            .prerequisite(kind, label, ResourceKind::StaticIp, compute.static_ip, &data_center)
            .await?;
        // Windows images authenticate with passwords, never shell keys.
        let shell_key = if image.platform.is_windows() {
            Requirement::None
        } else {
            compute.shell_key
        };
        let keypair_id = self
            .prerequisite(kind, label, ResourceKind::Keypair, shell_key, &data_center)
            .await?;

        let root_volume_product_id = if compute.root_volume_product == Requirement::Required {
            let product = self
                .defaults
                .volume_product(&self.provider, &capabilities)
                .await
                .ok_or_else(|| no_default(kind, label, "root volume product"))?;
            Some(product)
        } else {
            None
        };
        let password = (compute.password == Requirement::Required).then(generate_password);

        Ok(CreateRequest::Vm(VmLaunch {
            name: self.resource_name(kind),
            data_center,
            product_id,
            image_id: image.id,
            platform: image.platform,
            network_id,
            keypair_id,
            static_ip_id,
            root_volume_product_id,
            password,
        }))
    }

    async fn image_request(
        &self,
        label: &str,
        location: Option<&str>,
    ) -> Result<CreateRequest, Failure<P>> {
        let kind = ResourceKind::Image;
        let capabilities = self.required_capabilities(kind, label).await?;
        if !capabilities.image.capture {
            return Err(ProvisioningFailure::Unsupported {
                kind,
                label: label.to_string(),
                what: "image capture",
            });
        }

        let mut source = FixtureRequest::new(ResourceKind::Vm, STATEFUL).state(VmState::Running);
        source.location = location.map(str::to_string);
        let vm_id = self.source_fixture(kind, label, &source).await?;

        Ok(CreateRequest::Image(ImageCapture {
            name: self.resource_name(kind),
            vm_id,
        }))
    }

    async fn volume_request(
        &self,
        label: &str,
        location: Option<&str>,
    ) -> Result<CreateRequest, Failure<P>> {
        let kind = ResourceKind::Volume;
        let capabilities = self.required_capabilities(kind, label).await?;
        let data_center = self.data_center(kind, label, location).await?;

        let volume = capabilities.volume;
        let product_id = self
            .defaults
            .volume_product(&self.provider, &capabilities)
            .await;
        if volume.size_from_product && product_id.is_none() {
            return Err(no_default(kind, label, "volume product"));
        }
        let size_gb = (!volume.size_from_product).then(|| volume.minimum_size_gb.max(1));

        let network_id = self
            .prerequisite(kind, label, ResourceKind::Network, volume.vlan, &data_center)
            .await?;

        Ok(CreateRequest::Volume(VolumeCreate {
            name: self.resource_name(kind),
            data_center,
            product_id,
            size_gb,
            network_id,
        }))
    }

    async fn snapshot_request(
        &self,
        label: &str,
        location: Option<&str>,
    ) -> Result<CreateRequest, Failure<P>> {
        let kind = ResourceKind::Snapshot;
        let capabilities = self.required_capabilities(kind, label).await?;
        if !capabilities.volume.snapshots {
            return Err(ProvisioningFailure::Unsupported {
                kind,
                label: label.to_string(),
                what: "volume snapshots",
            });
        }

        let mut source = FixtureRequest::new(ResourceKind::Volume, STATEFUL);
        source.location = location.map(str::to_string);
        let volume_id = self.source_fixture(kind, label, &source).await?;

        Ok(CreateRequest::Snapshot(SnapshotCreate {
            name: self.resource_name(kind),
            volume_id,
        }))
    }

    /// Resolves one prerequisite according to its requirement level.
    ///
    /// Required prerequisites are provisioned under [`STATEFUL`], falling back
    /// to a stateless one. Optional prerequisites are only reused, never
    /// provisioned.
    async fn prerequisite(
        &self,
        kind: ResourceKind,
        label: &str,
        prerequisite: ResourceKind,
        requirement: Requirement,
        data_center: &str,
    ) -> Result<Option<String>, Failure<P>> {
        match requirement {
            Requirement::None => Ok(None),
            Requirement::Optional => Ok(self
                .table
                .get(prerequisite, STATEFUL)
                .or_else(|| self.table.get(prerequisite, STATELESS))),
            Requirement::Required => {
                let request = FixtureRequest::new(prerequisite, STATEFUL).location(data_center);
                self.source_fixture(kind, label, &request).await.map(Some)
            }
        }
    }

    /// Ensures a fixture another fixture is built from, falling back to a
    /// stateless one if it cannot be provisioned.
    async fn source_fixture(
        &self,
        kind: ResourceKind,
        label: &str,
        request: &FixtureRequest,
    ) -> Result<String, Failure<P>> {
        let cause = match Box::pin(self.ensure(request)).await {
            Ok(Some(id)) => return Ok(id),
            Ok(None) => None,
            Err(err) => {
                log::warn!("{kind} '{label}': cannot provision {}: {err}", request.kind);
                Some(Box::new(err) as Box<dyn std::error::Error + Send + Sync>)
            }
        };

        if let Some(id) = self.stateless(request.kind).await {
            log::info!("{kind} '{label}': using stateless {} {id}", request.kind);
            return Ok(id);
        }

        Err(ProvisioningFailure::Prerequisite {
            kind,
            label: label.to_string(),
            prerequisite: request.kind,
            source: cause,
        })
    }

    async fn required_capabilities(
        &self,
        kind: ResourceKind,
        label: &str,
    ) -> Result<Capabilities, Failure<P>> {
        self.capabilities()
            .await
            .map_err(|source| ProvisioningFailure::Provider {
                kind,
                label: label.to_string(),
                source,
            })
    }

    async fn data_center(
        &self,
        kind: ResourceKind,
        label: &str,
        location: Option<&str>,
    ) -> Result<String, Failure<P>> {
        if let Some(location) = location {
            return Ok(location.to_string());
        }
        self.defaults
            .data_center(&self.provider)
            .await
            .ok_or_else(|| no_default(kind, label, "data center"))
    }

    fn resource_name(&self, kind: ResourceKind) -> String {
        format!(
            "{}-{kind}-{}{:03}",
            self.config.name_prefix,
            Utc::now().timestamp_millis(),
            rand::thread_rng().gen_range(0..1000)
        )
    }
}

fn no_default<E>(kind: ResourceKind, label: &str, what: &'static str) -> ProvisioningFailure<E> {
    ProvisioningFailure::NoDefault {
        kind,
        label: label.to_string(),
        what,
    }
}

/// Random alphanumerics plus one character of each class most clouds demand.
fn generate_password() -> String {
    let mut password = Alphanumeric.sample_string(&mut rand::thread_rng(), PASSWORD_LEN);
    password.push_str("aA9");
    password
}
