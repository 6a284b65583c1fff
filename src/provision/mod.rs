//! Lazily provisioned, label-indexed fixtures.
//!
//! [`FixtureProvisioner`] is the entry point test cases use. It owns the
//! provider, the [`LabeledResourceTable`] and the run-wide [`Defaults`], and
//! hands out provider identifiers for labelled fixtures, creating each one
//! at most once per label.
//!
//! # Lookup Rules
//!
//! - [`STATELESS`]: any resource of the kind already known to the table;
//!   never provisions and never changes the state of what it finds.
//! - Any other label: the fixture recorded under that label, created on
//!   first use unless the request disables provisioning.
//!
//! Prerequisites created along the way (networks, keypairs, static IPs, the
//! VM an image is captured from, ...) are recorded like any other fixture
//! and are reclaimed by [`teardown_all`](FixtureProvisioner::teardown_all),
//! even if the fixture that needed them failed to provision.

mod request;

use std::error::Error as StdErr;

use thiserror::Error;
use tokio::sync::OnceCell;

use crate::config::HarnessConfig;
use crate::defaults::{Defaults, DefaultsSnapshot};
use crate::driver::{StateDriver, Transition};
use crate::table::{LabeledResourceTable, Slot};
use crate::teardown::{TeardownCoordinator, TeardownReport};
use crate::types::{
    Capabilities, Resource, ResourceKind, ResourceRecord, ResourceState, VmState, STATELESS,
};
use crate::{best_effort, CreateResource, ProviderError, ResourceAction};

/// Errors raised while provisioning a fixture.
#[derive(Debug, Error)]
pub enum ProvisioningFailure<E> {
    /// The provider rejected a call made on behalf of the fixture.
    #[error("provider failed to provision {kind} '{label}': {source}")]
    Provider {
        kind: ResourceKind,
        label: String,
        #[source]
        source: ProviderError<E>,
    },

    /// A run-wide default the fixture needs does not exist in this cloud.
    #[error("no default {what} available for {kind} '{label}'")]
    NoDefault {
        kind: ResourceKind,
        label: String,
        what: &'static str,
    },

    /// The cloud lacks a capability the fixture needs.
    #[error("{kind} '{label}' cannot be provisioned: {what} not supported")]
    Unsupported {
        kind: ResourceKind,
        label: String,
        what: &'static str,
    },

    /// A required prerequisite could neither be provisioned nor found.
    #[error("{kind} '{label}' requires a {prerequisite}, none is available")]
    Prerequisite {
        kind: ResourceKind,
        label: String,
        prerequisite: ResourceKind,
        #[source]
        source: Option<Box<dyn StdErr + Send + Sync>>,
    },
}

impl<E> ProvisioningFailure<E> {
    /// Returns `true` if the fixture is simply not available in this cloud.
    ///
    /// Callers should skip rather than fail the test in that case.
    pub fn is_unsupported(&self) -> bool {
        match self {
            Self::Provider { source, .. } => source.is_not_supported(),
            Self::NoDefault { .. } | Self::Unsupported { .. } | Self::Prerequisite { .. } => true,
        }
    }

    /// Returns the kind of fixture that failed.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Provider { kind, .. }
            | Self::NoDefault { kind, .. }
            | Self::Unsupported { kind, .. }
            | Self::Prerequisite { kind, .. } => *kind,
        }
    }
}

/// What a test case asks for.
///
/// # Example
///
/// ```
/// use cloudfixtures::FixtureRequest;
/// use cloudfixtures::types::{ResourceKind, VmState};
///
/// let request = FixtureRequest::new(ResourceKind::Vm, "dsnvm")
///     .state(VmState::Paused)
///     .location("us-east-1a");
/// assert!(request.provision_if_missing);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureRequest {
    pub kind: ResourceKind,
    pub label: String,
    /// State to drive a VM fixture into before returning it.
    pub state: Option<VmState>,
    /// Preferred data center for a new fixture.
    pub location: Option<String>,
    /// Create the fixture if the label is unknown.
    pub provision_if_missing: bool,
}

impl FixtureRequest {
    /// Requests the fixture labelled `label`, provisioning it if needed.
    pub fn new(kind: ResourceKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            state: None,
            location: None,
            provision_if_missing: true,
        }
    }

    /// Drives a VM fixture into `state` before returning it.
    pub fn state(mut self, state: VmState) -> Self {
        self.state = Some(state);
        self
    }

    /// Prefers a data center when the fixture has to be created.
    pub fn location(mut self, data_center: impl Into<String>) -> Self {
        self.location = Some(data_center.into());
        self
    }

    /// Sets whether a missing fixture is created.
    pub fn provision_if_missing(mut self, provision: bool) -> Self {
        self.provision_if_missing = provision;
        self
    }
}

/// Provisions and tracks shared fixtures for one harness run.
#[derive(Debug)]
pub struct FixtureProvisioner<P> {
    provider: P,
    config: HarnessConfig,
    table: LabeledResourceTable,
    defaults: Defaults,
    capabilities: OnceCell<Capabilities>,
}

impl<P> FixtureProvisioner<P>
where
    P: CreateResource + ResourceAction,
{
    /// Creates a provisioner with an empty table.
    pub fn new(provider: P, config: HarnessConfig) -> Self {
        Self {
            provider,
            config,
            table: LabeledResourceTable::new(),
            defaults: Defaults::new(),
            capabilities: OnceCell::new(),
        }
    }

    /// Returns the provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Returns the configuration.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Returns the fixture table.
    pub fn table(&self) -> &LabeledResourceTable {
        &self.table
    }

    /// Returns a state driver over this provisioner's provider.
    pub fn driver(&self) -> StateDriver<'_, P> {
        StateDriver::new(&self.provider, &self.config)
    }

    /// Computes every run-wide default not computed yet and returns them.
    ///
    /// Defaults that do not exist in this cloud are left empty.
    pub async fn defaults(&self) -> DefaultsSnapshot {
        let capabilities = self.capabilities_or_default().await;

        self.defaults.data_center(&self.provider).await;
        if let Some(image) = self.defaults.image(&self.provider, &capabilities).await {
            self.defaults
                .product(&self.provider, image.architecture)
                .await;
        }
        self.defaults
            .volume_product(&self.provider, &capabilities)
            .await;

        self.defaults.snapshot()
    }

    /// Adopts one existing resource per kind as the [`STATELESS`] fixture.
    ///
    /// Adopted resources are never modified or destroyed by the harness.
    /// Every failure is ignored; a kind without a suitable resource simply
    /// has no stateless fixture.
    pub async fn discover(&self) {
        for kind in ResourceKind::TEARDOWN_ORDER {
            let listed = self.provider.list(kind).await;
            let Some(resources) = best_effort(format_args!("list {kind} resources"), listed)
            else {
                continue;
            };

            if let Some(resource) = pick_stateless(kind, &resources) {
                if self.table.put(kind, STATELESS, &resource.id, true) {
                    log::info!("adopted existing {kind} {} as stateless fixture", resource.id);
                }
            }
        }
    }

    /// Returns the identifier of the fixture `request` names.
    ///
    /// `Ok(None)` means the fixture is not available and the caller asked not
    /// to create it, or asked for [`STATELESS`] and nothing exists. Concurrent
    /// calls for the same label create at most one resource and all observe
    /// its identifier. A failed creation frees the label again.
    ///
    /// A requested VM state is attempted but not guaranteed: the identifier
    /// is returned even if the VM could not be driven there. Callers that
    /// depend on the state use [`ensure_in_state`](Self::ensure_in_state).
    pub async fn ensure(
        &self,
        request: &FixtureRequest,
    ) -> Result<Option<String>, ProvisioningFailure<P::CustomError>> {
        let fixture = self.ensure_in_state(request).await?;
        Ok(fixture.map(|(id, _)| id))
    }

    /// Like [`ensure`](Self::ensure), but also reports how driving the VM to
    /// the requested state went.
    ///
    /// The [`Transition`] is `None` when no state was requested, the kind has
    /// no VM state, or the fixture is [`STATELESS`].
    pub async fn ensure_in_state(
        &self,
        request: &FixtureRequest,
    ) -> Result<Option<(String, Option<Transition>)>, ProvisioningFailure<P::CustomError>> {
        let kind = request.kind;
        let label = request.label.as_str();

        if label == STATELESS {
            return Ok(self.stateless(kind).await.map(|id| (id, None)));
        }

        if let Some(id) = self.table.get(kind, label) {
            let outcome = self.apply_state(&id, request).await;
            return Ok(Some((id, outcome)));
        }

        if !request.provision_if_missing {
            log::debug!("{kind} '{label}' not provisioned and provisioning disabled");
            return Ok(None);
        }

        let slot = self.table.claim(kind, label);
        let id = self
            .fill(kind, label, slot, request.location.as_deref())
            .await?
            .provider_id;

        let outcome = self.apply_state(&id, request).await;
        Ok(Some((id, outcome)))
    }

    /// Always creates a new fixture.
    ///
    /// If the requested label is taken, the fixture is recorded under a
    /// free variant of it; the returned record carries the label used.
    pub async fn provision(
        &self,
        request: &FixtureRequest,
    ) -> Result<ResourceRecord, ProvisioningFailure<P::CustomError>> {
        let kind = request.kind;
        if request.label == STATELESS {
            return Err(ProvisioningFailure::Unsupported {
                kind,
                label: request.label.clone(),
                what: "provisioning under the stateless label",
            });
        }

        let label = self.table.reserve_label(kind, &request.label);
        let slot = self.table.claim(kind, &label);
        let record = self
            .fill(kind, &label, slot, request.location.as_deref())
            .await?;

        self.apply_state(&record.provider_id, request).await;
        Ok(record)
    }

    /// Releases every fixture this run created.
    pub async fn teardown_all(&self) -> TeardownReport {
        TeardownCoordinator::new(&self.provider, &self.table, &self.config)
            .teardown_all()
            .await
    }

    /// Resolves a stateless lookup.
    ///
    /// VM candidates are checked against the provider and skipped if they are
    /// gone or terminated.
    async fn stateless(&self, kind: ResourceKind) -> Option<String> {
        for record in self.table.stateless_candidates(kind) {
            if !kind.has_vm_state() {
                return Some(record.provider_id);
            }

            let found = self.provider.get(kind, &record.provider_id).await;
            match best_effort(format_args!("look up {kind} {}", record.provider_id), found) {
                Some(Some(resource))
                    if resource.state != ResourceState::Machine(VmState::Terminated) =>
                {
                    return Some(record.provider_id);
                }
                _ => log::debug!("stateless {kind} {} is gone", record.provider_id),
            }
        }
        None
    }

    /// Creates the resource behind `slot` unless a concurrent caller already
    /// did, freeing the label if creation fails.
    async fn fill(
        &self,
        kind: ResourceKind,
        label: &str,
        slot: Slot,
        location: Option<&str>,
    ) -> Result<ResourceRecord, ProvisioningFailure<P::CustomError>> {
        let filled = slot
            .get_or_try_init(|| self.create(kind, label, location))
            .await
            .cloned();
        if filled.is_err() && self.table.release(kind, label, &slot) {
            log::debug!("{kind} label '{label}' freed after failed creation");
        }
        filled
    }

    async fn apply_state(&self, id: &str, request: &FixtureRequest) -> Option<Transition> {
        let target = request.state?;
        if !request.kind.has_vm_state() {
            return None;
        }

        let mut driver = self.driver();
        if let Ok(capabilities) = self.capabilities().await {
            driver = driver.with_capabilities(capabilities);
        }

        let outcome = driver.drive_to(id, target).await;
        if !outcome.is_reached() {
            log::warn!("{} '{}' ({id}) not {target}: {outcome}", request.kind, request.label);
        }
        Some(outcome)
    }

    async fn capabilities(&self) -> Result<Capabilities, ProviderError<P::CustomError>> {
        self.capabilities
            .get_or_try_init(|| self.provider.capabilities())
            .await
            .copied()
    }

    async fn capabilities_or_default(&self) -> Capabilities {
        let queried = self.capabilities().await;
        best_effort(format_args!("query capabilities"), queried).unwrap_or_default()
    }
}

fn pick_stateless(kind: ResourceKind, resources: &[Resource]) -> Option<&Resource> {
    if !kind.has_vm_state() {
        return resources
            .iter()
            .find(|resource| resource.state == ResourceState::Available);
    }

    resources
        .iter()
        .find(|resource| resource.state == ResourceState::Machine(VmState::Running))
        .or_else(|| {
            resources.iter().find(|resource| {
                matches!(resource.state, ResourceState::Machine(state) if state != VmState::Terminated)
            })
        })
}
