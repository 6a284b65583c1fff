//! End-of-run release of every fixture the harness created.
//!
//! Kinds are released in [`ResourceKind::TEARDOWN_ORDER`]: VMs first, since
//! they may still reference images, volumes and network resources. Volumes
//! are released in two passes: a forced detach of every volume, a grace
//! period for the provider to finish detaching, then a delete of every
//! volume.
//!
//! Nothing here propagates. Each failure is recorded in the
//! [`TeardownReport`] and logged, and the remaining fixtures are still
//! attempted.

use thiserror::Error;
use tokio::time::sleep;

use crate::config::HarnessConfig;
use crate::table::LabeledResourceTable;
use crate::types::{Action, ResourceKind, ResourceRecord};
use crate::{best_effort, ResourceAction};

/// A release action that failed.
#[derive(Debug, Clone, Error)]
#[error("{action} of {kind} {id} failed: {message}")]
pub struct TeardownError {
    pub kind: ResourceKind,
    pub id: String,
    pub action: Action,
    /// Rendered provider error.
    pub message: String,
}

/// What [`TeardownCoordinator::teardown_all`] did.
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    /// Harness-created fixtures whose release went through.
    pub released: Vec<ResourceRecord>,
    /// Pre-existing fixtures left untouched.
    pub skipped: Vec<ResourceRecord>,
    /// Fixtures whose release failed, with the failure.
    pub failed: Vec<(ResourceRecord, TeardownError)>,
}

impl TeardownReport {
    /// Returns `true` if every release succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Releases the fixtures recorded in a table.
#[derive(Debug)]
pub struct TeardownCoordinator<'a, P> {
    provider: &'a P,
    table: &'a LabeledResourceTable,
    config: &'a HarnessConfig,
}

impl<'a, P: ResourceAction> TeardownCoordinator<'a, P> {
    pub fn new(
        provider: &'a P,
        table: &'a LabeledResourceTable,
        config: &'a HarnessConfig,
    ) -> Self {
        Self {
            provider,
            table,
            config,
        }
    }

    /// Drains the table and releases every harness-created fixture.
    ///
    /// Pre-existing fixtures are dropped from the table without any provider
    /// call. Calling this again releases only fixtures recorded since.
    pub async fn teardown_all(&self) -> TeardownReport {
        let mut report = TeardownReport::default();

        for kind in ResourceKind::TEARDOWN_ORDER {
            let (owned, pool): (Vec<_>, Vec<_>) = self
                .table
                .drain(kind)
                .into_iter()
                .partition(|record| !record.pool_origin);
            report.skipped.extend(pool);

            if owned.is_empty() {
                continue;
            }
            log::info!("releasing {} {kind} fixture(s)", owned.len());

            match kind {
                ResourceKind::Volume => self.release_volumes(owned, &mut report).await,
                ResourceKind::Vm => self.release(owned, Action::Terminate, &mut report).await,
                _ => self.release(owned, Action::Delete, &mut report).await,
            }
        }

        if !report.is_clean() {
            log::warn!("teardown left {} fixture(s) behind", report.failed.len());
        }
        report
    }

    async fn release(
        &self,
        records: Vec<ResourceRecord>,
        action: Action,
        report: &mut TeardownReport,
    ) {
        for record in records {
            match self.act(&record, action).await {
                Ok(()) => report.released.push(record),
                Err(err) => {
                    log::warn!("{err}");
                    report.failed.push((record, err));
                }
            }
        }
    }

    async fn release_volumes(&self, records: Vec<ResourceRecord>, report: &mut TeardownReport) {
        for record in &records {
            // Volumes that were never attached fail here.
            let detached = self.act(record, Action::Detach { force: true }).await;
            best_effort(format_args!("detach volume {}", record.provider_id), detached);
        }

        sleep(self.config.detach_grace).await;

        self.release(records, Action::Delete, report).await;
    }

    async fn act(&self, record: &ResourceRecord, action: Action) -> Result<(), TeardownError> {
        debug_assert!(!record.pool_origin);

        self.provider
            .perform(record.kind, &record.provider_id, action)
            .await
            .map_err(|err| TeardownError {
                kind: record.kind,
                id: record.provider_id.clone(),
                action,
                message: err.to_string(),
            })
    }
}
