//! Quota tracker: limit checks and usage counter maintenance.
//!
//! Limits are soft. Two callers may pass `check_limit` at the same time
//! and both create a resource; the counter then sits above the limit
//! until usage drops or the limit is raised.

use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::organization::{Organization, Resource};
use warden_core::models::quota::{QuotaEntry, QuotaSnapshot};
use warden_core::repository::OrganizationRepository;

use crate::directory::OrganizationDirectory;

#[derive(Clone)]
pub struct QuotaTracker<O: OrganizationRepository> {
    directory: OrganizationDirectory<O>,
}

impl<O: OrganizationRepository> QuotaTracker<O> {
    pub fn new(organizations: O) -> Self {
        Self {
            directory: OrganizationDirectory::new(organizations),
        }
    }

    /// Current limit and usage for one resource, read from the store.
    pub async fn usage(&self, organization_id: Uuid, resource: Resource) -> WardenResult<QuotaEntry> {
        let org = self.directory.by_id(organization_id).await?;
        let entry = QuotaSnapshot::of(&org).entry(resource);
        if entry.is_violated() {
            warn!(
                organization_id = %organization_id,
                resource = %resource,
                limit = entry.limit,
                current = entry.current,
                "Usage is above the configured limit"
            );
        }
        Ok(entry)
    }

    /// Whether one more unit of `resource` fits under the limit.
    ///
    /// Always reads the store; cached contexts are not consulted.
    pub async fn check_limit(&self, organization_id: Uuid, resource: Resource) -> WardenResult<bool> {
        let entry = self.usage(organization_id, resource).await?;
        debug!(
            organization_id = %organization_id,
            resource = %resource,
            limit = entry.limit,
            current = entry.current,
            "Quota check"
        );
        Ok(entry.has_room())
    }

    /// Apply `delta` to a usage counter in one guarded store update and
    /// return the new value.
    pub async fn record_usage_delta(
        &self,
        organization_id: Uuid,
        resource: Resource,
        delta: i64,
    ) -> WardenResult<u64> {
        let org = self
            .directory
            .repository()
            .adjust_usage(organization_id, resource, delta)
            .await?;
        let current = org.usage.get(resource);
        debug!(
            organization_id = %organization_id,
            resource = %resource,
            delta,
            current,
            "Usage recorded"
        );
        Ok(current)
    }

    /// Overwrite a counter with an externally measured value.
    pub async fn reconcile_usage(
        &self,
        organization_id: Uuid,
        resource: Resource,
        actual: u64,
    ) -> WardenResult<u64> {
        let org = self
            .directory
            .repository()
            .set_usage(organization_id, resource, actual)
            .await?;
        info!(
            organization_id = %organization_id,
            resource = %resource,
            actual,
            "Usage reconciled"
        );
        Ok(org.usage.get(resource))
    }

    /// Read-only view of every quota of an already loaded organization.
    pub fn snapshot(&self, organization: &Organization) -> QuotaSnapshot {
        QuotaSnapshot::of(organization)
    }
}
