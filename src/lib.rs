//! Shared fixture lifecycle management for cloud-provider conformance harnesses.
//!
//! A conformance suite runs many independent test cases against one live
//! cloud account. Provisioning a fresh VM, volume or image per test is slow
//! and expensive, so this crate keeps a table of shared fixtures indexed by a
//! caller-chosen label, provisions each one at most once, drives VMs into the
//! state a test needs, and tears everything it created down at the end of
//! the run.
//!
//! The concrete cloud is plugged in through three traits:
//!
//! - [`CloudProvider`] - read-only queries (capabilities, catalogs, lookups)
//! - [`CreateResource`] - resource creation
//! - [`ResourceAction`] - state changes and destruction
//!
//! # Example
//!
//! ```no_run
//! use cloudfixtures::{FixtureProvisioner, FixtureRequest, HarnessConfig};
//! use cloudfixtures::types::{ResourceKind, VmState};
//! # use cloudfixtures::{CreateResource, ResourceAction};
//!
//! # async fn example<P: CreateResource + ResourceAction>(provider: P)
//! # -> Result<(), Box<dyn std::error::Error>> {
//! let fixtures = FixtureProvisioner::new(provider, HarnessConfig::default());
//! fixtures.discover().await;
//!
//! let request = FixtureRequest::new(ResourceKind::Vm, "dsnvm").state(VmState::Running);
//! if let Some(vm_id) = fixtures.ensure(&request).await? {
//!     println!("running VM: {vm_id}");
//! }
//!
//! let report = fixtures.teardown_all().await;
//! println!("released {} fixtures", report.released.len());
//! # Ok(())
//! # }
//! ```

use std::error::Error as StdErr;
use std::fmt;

pub mod config;
pub mod defaults;
pub mod driver;
pub mod provision;
pub mod table;
pub mod teardown;
pub mod types;

pub use config::{ConfigError, HarnessConfig};
pub use defaults::{DefaultImage, Defaults, DefaultsSnapshot};
pub use driver::{Plan, StateDriver, Step, Transition};
pub use provision::{FixtureProvisioner, FixtureRequest, ProvisioningFailure};
pub use table::LabeledResourceTable;
pub use teardown::{TeardownCoordinator, TeardownError, TeardownReport};

use types::{
    Action, Architecture, Capabilities, CreateRequest, DataCenter, ImageCatalog, ImageFilter,
    MachineImage, Resource, ResourceKind, VmProduct, VolumeProduct,
};

/// Errors returned by provider calls.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError<T> {
    /// The provider does not implement the operation.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// The resource does not exist.
    #[error("resource not found")]
    NotFound,

    /// The credentials were rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// Provider-specific failure.
    #[error("{0}")]
    Custom(T),
}

impl<T> ProviderError<T> {
    /// Returns `true` if the provider reported the operation as unsupported.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, ProviderError::NotSupported(_))
    }
}

/// Read-only access to a cloud account.
///
/// Every provider implements this trait. Creation and state changes are
/// split into [`CreateResource`] and [`ResourceAction`].
#[allow(async_fn_in_trait)]
pub trait CloudProvider {
    /// Provider-specific error carried by [`ProviderError::Custom`].
    type CustomError: StdErr + Send + Sync + 'static;

    /// Returns what the provider supports and requires.
    async fn capabilities(&self) -> Result<Capabilities, ProviderError<Self::CustomError>>;

    /// Lists the data centers of the configured region.
    async fn list_data_centers(&self)
        -> Result<Vec<DataCenter>, ProviderError<Self::CustomError>>;

    /// Lists the VM products available for an architecture.
    async fn list_products(
        &self,
        architecture: Architecture,
    ) -> Result<Vec<VmProduct>, ProviderError<Self::CustomError>>;

    /// Lists machine images in a catalog matching a filter.
    async fn list_images(
        &self,
        catalog: ImageCatalog,
        filter: &ImageFilter,
    ) -> Result<Vec<MachineImage>, ProviderError<Self::CustomError>>;

    /// Lists volume products.
    async fn list_volume_products(
        &self,
    ) -> Result<Vec<VolumeProduct>, ProviderError<Self::CustomError>>;

    /// Looks up a single resource; `Ok(None)` if it does not exist.
    async fn get(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Option<Resource>, ProviderError<Self::CustomError>>;

    /// Lists every resource of a kind in the account.
    async fn list(&self, kind: ResourceKind)
        -> Result<Vec<Resource>, ProviderError<Self::CustomError>>;
}

/// Providers that can create resources.
#[allow(async_fn_in_trait)]
pub trait CreateResource: CloudProvider {
    /// Creates a resource and returns its provider-assigned identifier.
    async fn create(
        &self,
        request: &CreateRequest,
    ) -> Result<String, ProviderError<Self::CustomError>>;
}

/// Providers that can change the state of, or destroy, resources.
#[allow(async_fn_in_trait)]
pub trait ResourceAction: CloudProvider {
    /// Performs an action on a resource.
    async fn perform(
        &self,
        kind: ResourceKind,
        id: &str,
        action: Action,
    ) -> Result<(), ProviderError<Self::CustomError>>;
}

/// Runs a step whose failure is an expected outcome.
///
/// Discovery, default computation and teardown all go through here, so the
/// places where errors are dropped can be found by searching for it.
pub(crate) fn best_effort<T, E: fmt::Display>(
    step: fmt::Arguments<'_>,
    result: Result<T, E>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            log::debug!("best-effort step failed ({step}): {err}");
            None
        }
    }
}
