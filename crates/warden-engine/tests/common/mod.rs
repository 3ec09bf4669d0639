//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use tokio::sync::Notify;
use warden_core::models::context::TenantContext;
use warden_core::models::membership::{CreateMembership, Membership, UpdateMembership};
use warden_core::models::organization::{
    CreateOrganization, Organization, Resource, SubscriptionTier, UpdateOrganization,
};
use warden_core::repository::{
    MembershipRepository, OrganizationRepository, PaginatedResult, Pagination,
};
use warden_db::repository::{
    SurrealMembershipRepository, SurrealOrganizationRepository, SurrealTenantRecordRepository,
};
use warden_engine::{
    ContextCache, EngineConfig, NewOrganization, QueryGateway, TenantAdmin, TenantResolver,
};

/// Organization repository that counts reads and can be switched into
/// failing or stalling.
#[derive(Clone)]
pub struct ObservedOrganizations {
    inner: SurrealOrganizationRepository<Db>,
    reads: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    stall: Arc<AtomicBool>,
}

impl ObservedOrganizations {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn set_stalling(&self, stalling: bool) {
        self.stall.store(stalling, Ordering::SeqCst);
    }

    async fn observe(&self) -> WardenResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(WardenError::StoreUnavailable("connection reset".into()));
        }
        Ok(())
    }
}

impl OrganizationRepository for ObservedOrganizations {
    async fn create(&self, input: CreateOrganization) -> WardenResult<Organization> {
        self.inner.create(input).await
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<Organization> {
        self.observe().await?;
        self.inner.get_by_id(id).await
    }

    async fn get_by_code(&self, code: &str) -> WardenResult<Organization> {
        self.observe().await?;
        self.inner.get_by_code(code).await
    }

    async fn get_by_domain(&self, domain: &str) -> WardenResult<Organization> {
        self.observe().await?;
        self.inner.get_by_domain(domain).await
    }

    async fn update(&self, id: Uuid, input: UpdateOrganization) -> WardenResult<Organization> {
        self.inner.update(id, input).await
    }

    async fn adjust_usage(
        &self,
        id: Uuid,
        resource: Resource,
        delta: i64,
    ) -> WardenResult<Organization> {
        self.inner.adjust_usage(id, resource, delta).await
    }

    async fn set_usage(&self, id: Uuid, resource: Resource, value: u64) -> WardenResult<Organization> {
        self.inner.set_usage(id, resource, value).await
    }

    async fn list(&self, pagination: Pagination) -> WardenResult<PaginatedResult<Organization>> {
        self.inner.list(pagination).await
    }
}

pub type Memberships = SurrealMembershipRepository<Db>;

/// Membership repository whose next `get` holds its result until
/// released, so a test can run a mutation between a resolver's read and
/// its cache insert.
#[derive(Clone)]
pub struct GatedMemberships {
    inner: Memberships,
    armed: Arc<AtomicBool>,
    pub read_done: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl GatedMemberships {
    pub fn new(inner: Memberships) -> Self {
        Self {
            inner,
            armed: Arc::new(AtomicBool::new(false)),
            read_done: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl MembershipRepository for GatedMemberships {
    async fn create(&self, input: CreateMembership) -> WardenResult<Membership> {
        self.inner.create(input).await
    }

    async fn get(&self, user_id: Uuid, organization_id: Uuid) -> WardenResult<Membership> {
        let result = self.inner.get(user_id, organization_id).await;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.read_done.notify_one();
            self.release.notified().await;
        }
        result
    }

    async fn list_active_for_user(&self, user_id: Uuid) -> WardenResult<Vec<Membership>> {
        self.inner.list_active_for_user(user_id).await
    }

    async fn list_by_organization(
        &self,
        organization_id: Uuid,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<Membership>> {
        self.inner.list_by_organization(organization_id, pagination).await
    }

    async fn count_active(&self, organization_id: Uuid) -> WardenResult<u64> {
        self.inner.count_active(organization_id).await
    }

    async fn update(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        input: UpdateMembership,
    ) -> WardenResult<Membership> {
        self.inner.update(user_id, organization_id, input).await
    }
}

pub struct Harness {
    pub db: Surreal<Db>,
    pub organizations: ObservedOrganizations,
    pub memberships: Memberships,
    pub cache: Arc<ContextCache>,
    pub resolver: TenantResolver<ObservedOrganizations, Memberships>,
    pub admin: TenantAdmin<ObservedOrganizations, Memberships>,
    pub gateway: QueryGateway<SurrealTenantRecordRepository<Db>>,
}

pub async fn harness() -> Harness {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();

    let config = EngineConfig::default();
    let organizations = ObservedOrganizations {
        inner: SurrealOrganizationRepository::new(db.clone()),
        reads: Arc::new(AtomicUsize::new(0)),
        fail: Arc::new(AtomicBool::new(false)),
        stall: Arc::new(AtomicBool::new(false)),
    };
    let memberships = SurrealMembershipRepository::new(db.clone());
    let cache = Arc::new(ContextCache::from_config(&config));

    Harness {
        resolver: TenantResolver::new(organizations.clone(), memberships.clone(), cache.clone()),
        admin: TenantAdmin::new(
            organizations.clone(),
            memberships.clone(),
            cache.clone(),
            config.clone(),
        ),
        gateway: QueryGateway::new(SurrealTenantRecordRepository::new(db.clone()), &config),
        db,
        organizations,
        memberships,
        cache,
    }
}

pub fn new_organization(code: &str, tier: SubscriptionTier) -> NewOrganization {
    NewOrganization {
        code: code.into(),
        name: format!("{code} Ltd"),
        primary_domain: format!("{code}.example"),
        additional_domains: vec![],
        tier,
        settings: None,
    }
}

impl Harness {
    /// Create an organization and return it with its owner's context.
    pub async fn organization(
        &self,
        code: &str,
        tier: SubscriptionTier,
    ) -> (Organization, TenantContext) {
        let owner = Uuid::new_v4();
        let (org, _) = self
            .admin
            .initialize_organization(new_organization(code, tier), owner)
            .await
            .unwrap();
        let context = self.resolver.resolve(owner, Some(org.id)).await.unwrap();
        (org, context)
    }
}
