//! Time-bounded cache of resolved tenant contexts.
//!
//! Each entry carries its own deadline, fixed when it is inserted. A
//! tokio timer removes the entry when the deadline passes; re-inserting
//! the same key bumps its generation so the older timer leaves the newer
//! entry alone. Reads also check the deadline, so an entry is never
//! served late even if its timer has not run yet.
//!
//! Every invalidation advances an epoch under the write lock. A resolver
//! takes a [`CacheTicket`] before it reads the store and inserts with
//! [`ContextCache::put_if_current`]; if any invalidation ran in between,
//! the insert is dropped, so a context read before a mutation cannot
//! outlive that mutation's invalidation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;
use warden_core::models::context::TenantContext;

use crate::config::EngineConfig;

/// Which organization a cached context was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrgSelector {
    /// No organization was named; the user's default was resolved.
    Default,
    Explicit(Uuid),
}

impl From<Option<Uuid>> for OrgSelector {
    fn from(organization_id: Option<Uuid>) -> Self {
        organization_id.map_or(OrgSelector::Default, OrgSelector::Explicit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub user_id: Uuid,
    pub selector: OrgSelector,
}

impl CacheKey {
    pub fn new(user_id: Uuid, organization_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            selector: organization_id.into(),
        }
    }
}

struct Entry {
    context: TenantContext,
    expires_at: Instant,
    generation: u64,
}

type Entries = RwLock<HashMap<CacheKey, Entry>>;

/// Invalidation epoch observed before a resolution started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTicket(u64);

pub struct ContextCache {
    entries: Arc<Entries>,
    ttl: Duration,
    generation: AtomicU64,
    epoch: AtomicU64,
}

impl ContextCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            generation: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(Duration::from_secs(config.context_ttl_secs))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &CacheKey) -> Option<TenantContext> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                debug!(user_id = %key.user_id, selector = ?key.selector, "Context cache hit");
                Some(entry.context.clone())
            }
            _ => {
                debug!(user_id = %key.user_id, selector = ?key.selector, "Context cache miss");
                None
            }
        }
    }

    /// Capture the invalidation epoch. Take it before reading the store.
    pub fn ticket(&self) -> CacheTicket {
        CacheTicket(self.epoch.load(Ordering::Acquire))
    }

    /// Insert or replace the context for `key`. Its deadline is now plus
    /// the cache TTL.
    pub fn put(&self, key: CacheKey, context: TenantContext) {
        let mut entries = self.entries.write();
        self.insert(&mut entries, key, context);
    }

    /// [`put`](Self::put), unless an invalidation ran after `ticket` was
    /// taken. Returns whether the context was stored.
    pub fn put_if_current(
        &self,
        ticket: CacheTicket,
        key: CacheKey,
        context: TenantContext,
    ) -> bool {
        let mut entries = self.entries.write();
        if self.epoch.load(Ordering::Acquire) != ticket.0 {
            debug!(
                user_id = %key.user_id,
                selector = ?key.selector,
                "Context invalidated during resolution, not cached"
            );
            return false;
        }
        self.insert(&mut entries, key, context)
    }

    fn insert(
        &self,
        entries: &mut HashMap<CacheKey, Entry>,
        key: CacheKey,
        context: TenantContext,
    ) -> bool {
        let Some(expires_at) = Instant::now().checked_add(self.ttl) else {
            warn!(ttl_secs = self.ttl.as_secs(), "Context TTL out of range, not cached");
            return false;
        };
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            key,
            Entry {
                context,
                expires_at,
                generation,
            },
        );

        // Outside a runtime there is no timer; the read-side deadline
        // check still applies.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return true;
        };
        let entries = Arc::downgrade(&self.entries);
        handle.spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            let Some(entries) = entries.upgrade() else {
                return;
            };
            let mut entries = entries.write();
            if entries.get(&key).is_some_and(|e| e.generation == generation) {
                entries.remove(&key);
                debug!(user_id = %key.user_id, selector = ?key.selector, "Context expired");
            }
        });
        true
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut entries = self.entries.write();
        self.epoch.fetch_add(1, Ordering::Release);
        entries.remove(key).is_some()
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write();
        self.epoch.fetch_add(1, Ordering::Release);
        entries.clear();
    }

    /// Drop every context of one user, explicit and default alike.
    pub fn invalidate_user(&self, user_id: Uuid) -> usize {
        self.retain(|key, _| key.user_id != user_id)
    }

    /// Drop every context that resolved to `organization_id`, including
    /// default-selector entries that happened to land there.
    pub fn invalidate_organization(&self, organization_id: Uuid) -> usize {
        self.retain(|_, entry| entry.context.organization_id() != organization_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn retain(&self, mut keep: impl FnMut(&CacheKey, &Entry) -> bool) -> usize {
        let mut entries = self.entries.write();
        self.epoch.fetch_add(1, Ordering::Release);
        let before = entries.len();
        entries.retain(|key, entry| keep(key, entry));
        before - entries.len()
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use warden_core::models::membership::{MemberRole, Membership, MembershipStatus};
    use warden_core::models::organization::{
        ComplianceSettings, Organization, ResourceUsage, SecuritySettings, SubscriptionStatus,
        SubscriptionTier,
    };
    use warden_core::models::permission::derive;
    use warden_core::models::quota::QuotaSnapshot;

    use super::*;

    fn context(user_id: Uuid, organization_id: Uuid) -> TenantContext {
        let organization = Organization {
            id: organization_id,
            code: "acme".into(),
            name: "Acme".into(),
            primary_domain: "acme.com".into(),
            additional_domains: vec![],
            tier: SubscriptionTier::Free,
            subscription_status: SubscriptionStatus::Active,
            limits: SubscriptionTier::Free.default_limits(),
            usage: ResourceUsage::default(),
            settings: serde_json::json!({}),
            feature_flags: BTreeMap::new(),
            security: SecuritySettings::default(),
            compliance: ComplianceSettings::default(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let membership = Membership {
            user_id,
            organization_id,
            role: MemberRole::Member,
            status: MembershipStatus::Active,
            custom_permissions: vec![],
            invitation: None,
            invited_by: None,
            joined_at: Utc::now(),
            deactivated_by: None,
            deactivated_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        TenantContext {
            permissions: derive(MemberRole::Member, &[]),
            feature_flags: organization.effective_feature_flags(),
            quotas: QuotaSnapshot::of(&organization),
            organization,
            membership,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_their_ttl() {
        let cache = ContextCache::new(Duration::from_secs(60));
        let (user, org) = (Uuid::new_v4(), Uuid::new_v4());
        let key = CacheKey::new(user, Some(org));

        cache.put(key, context(user, org));
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(cache.get(&key).is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reinsert_is_not_evicted_by_the_older_timer() {
        let cache = ContextCache::new(Duration::from_secs(60));
        let (user, org) = (Uuid::new_v4(), Uuid::new_v4());
        let key = CacheKey::new(user, None);

        cache.put(key, context(user, org));
        tokio::time::sleep(Duration::from_secs(30)).await;
        cache.put(key, context(user, org));

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert!(cache.get(&key).is_some());
        assert_eq!(cache.len(), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn invalidation_by_user_and_by_organization() {
        let cache = ContextCache::new(Duration::from_secs(60));
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let (acme, globex) = (Uuid::new_v4(), Uuid::new_v4());

        cache.put(CacheKey::new(alice, Some(acme)), context(alice, acme));
        cache.put(CacheKey::new(alice, None), context(alice, acme));
        cache.put(CacheKey::new(bob, Some(globex)), context(bob, globex));
        cache.put(CacheKey::new(bob, Some(acme)), context(bob, acme));
        assert_eq!(cache.len(), 4);

        // The default-selector entry resolved to acme and goes too.
        assert_eq!(cache.invalidate_organization(acme), 3);
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.invalidate_user(bob), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_single_key_and_all() {
        let cache = ContextCache::new(Duration::from_secs(60));
        let (user, org) = (Uuid::new_v4(), Uuid::new_v4());
        let key = CacheKey::new(user, Some(org));

        cache.put(key, context(user, org));
        cache.put(CacheKey::new(user, None), context(user, org));
        assert!(cache.invalidate(&key));
        assert!(!cache.invalidate(&key));
        assert_eq!(cache.len(), 1);

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidation_during_resolution_discards_the_late_put() {
        let cache = ContextCache::new(Duration::from_secs(60));
        let (user, org) = (Uuid::new_v4(), Uuid::new_v4());
        let key = CacheKey::new(user, Some(org));

        let ticket = cache.ticket();
        cache.invalidate_user(user);
        assert!(!cache.put_if_current(ticket, key, context(user, org)));
        assert!(cache.get(&key).is_none());

        let ticket = cache.ticket();
        assert!(cache.put_if_current(ticket, key, context(user, org)));
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn every_kind_of_invalidation_advances_the_epoch() {
        let cache = ContextCache::new(Duration::from_secs(60));
        let (user, org) = (Uuid::new_v4(), Uuid::new_v4());

        let ticket = cache.ticket();
        cache.invalidate(&CacheKey::new(user, None));
        assert_ne!(cache.ticket(), ticket);

        let ticket = cache.ticket();
        cache.invalidate_organization(org);
        assert_ne!(cache.ticket(), ticket);

        let ticket = cache.ticket();
        cache.invalidate_all();
        assert_ne!(cache.ticket(), ticket);
    }

    #[tokio::test]
    async fn oversized_ttl_is_not_cached_and_does_not_panic() {
        let cache = ContextCache::new(Duration::MAX);
        let (user, org) = (Uuid::new_v4(), Uuid::new_v4());
        let key = CacheKey::new(user, Some(org));

        cache.put(key, context(user, org));
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }
}
