//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Tenant-owned data is only
//! reachable through [`TenantRecordRepository`], whose every method
//! requires an `organization_id`.

use uuid::Uuid;

use crate::error::WardenResult;
use crate::models::{
    membership::{CreateMembership, Membership, UpdateMembership},
    organization::{CreateOrganization, Organization, Resource, UpdateOrganization},
    record::{Filter, TenantRecord},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Organizations & memberships (global scope)
// ---------------------------------------------------------------------------

/// Organization rows. Lookups return deactivated organizations too;
/// filtering on `is_active` is the directory's job.
pub trait OrganizationRepository: Send + Sync {
    fn create(
        &self,
        input: CreateOrganization,
    ) -> impl Future<Output = WardenResult<Organization>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<Organization>> + Send;
    fn get_by_code(&self, code: &str) -> impl Future<Output = WardenResult<Organization>> + Send;
    /// Match on the primary domain or any additional domain.
    fn get_by_domain(
        &self,
        domain: &str,
    ) -> impl Future<Output = WardenResult<Organization>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateOrganization,
    ) -> impl Future<Output = WardenResult<Organization>> + Send;
    /// Atomically add `delta` to a usage counter in a single store-side
    /// update. Fails with `Validation` if the counter would drop below
    /// zero.
    fn adjust_usage(
        &self,
        id: Uuid,
        resource: Resource,
        delta: i64,
    ) -> impl Future<Output = WardenResult<Organization>> + Send;
    /// Overwrite a usage counter with a reconciled value.
    fn set_usage(
        &self,
        id: Uuid,
        resource: Resource,
        value: u64,
    ) -> impl Future<Output = WardenResult<Organization>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<Organization>>> + Send;
}

pub trait MembershipRepository: Send + Sync {
    /// Fails with `AlreadyExists` if the pair already has a row, in any
    /// status.
    fn create(
        &self,
        input: CreateMembership,
    ) -> impl Future<Output = WardenResult<Membership>> + Send;
    fn get(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> impl Future<Output = WardenResult<Membership>> + Send;
    /// Active memberships of a user, earliest `joined_at` first.
    fn list_active_for_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = WardenResult<Vec<Membership>>> + Send;
    fn list_by_organization(
        &self,
        organization_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<Membership>>> + Send;
    fn count_active(&self, organization_id: Uuid)
    -> impl Future<Output = WardenResult<u64>> + Send;
    fn update(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        input: UpdateMembership,
    ) -> impl Future<Output = WardenResult<Membership>> + Send;
}

// ---------------------------------------------------------------------------
// Tenant-owned tables
// ---------------------------------------------------------------------------

/// Row access for tenant-owned tables. The `organization_id` argument
/// is a mandatory predicate on every statement.
pub trait TenantRecordRepository: Send + Sync {
    fn insert(
        &self,
        table: &str,
        organization_id: Uuid,
        data: serde_json::Value,
    ) -> impl Future<Output = WardenResult<TenantRecord>> + Send;
    fn select(
        &self,
        table: &str,
        organization_id: Uuid,
        filters: &[Filter],
        limit: Option<u64>,
    ) -> impl Future<Output = WardenResult<Vec<TenantRecord>>> + Send;
    /// Merge `patch` into the record's data. A record owned by another
    /// organization is reported as `NotFound`.
    fn update(
        &self,
        table: &str,
        organization_id: Uuid,
        id: Uuid,
        patch: serde_json::Value,
    ) -> impl Future<Output = WardenResult<TenantRecord>> + Send;
    fn delete(
        &self,
        table: &str,
        organization_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = WardenResult<()>> + Send;
}
