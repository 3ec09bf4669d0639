//! Tenant context resolution.
//!
//! Turns `(user, requested organization)` into a [`TenantContext`]:
//! cache lookup, default organization selection, organization and
//! membership validation, permission derivation, quota snapshot.
//! Failed resolutions are never cached.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::context::TenantContext;
use warden_core::models::permission::derive;
use warden_core::models::quota::QuotaSnapshot;
use warden_core::repository::{MembershipRepository, OrganizationRepository};

use crate::cache::{CacheKey, ContextCache};
use crate::directory::OrganizationDirectory;

/// Tenant context resolver.
///
/// Generic over repository implementations so that the engine has no
/// dependency on the database crate.
pub struct TenantResolver<O: OrganizationRepository, M: MembershipRepository> {
    directory: OrganizationDirectory<O>,
    memberships: M,
    cache: Arc<ContextCache>,
}

impl<O: OrganizationRepository, M: MembershipRepository> TenantResolver<O, M> {
    pub fn new(organizations: O, memberships: M, cache: Arc<ContextCache>) -> Self {
        Self {
            directory: OrganizationDirectory::new(organizations),
            memberships,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    pub fn directory(&self) -> &OrganizationDirectory<O> {
        &self.directory
    }

    /// Resolve the context of `user_id` in `organization_id`, or in the
    /// user's earliest-joined active organization when none is given.
    ///
    /// Dropping the returned future abandons the resolution; nothing is
    /// cached in that case.
    pub async fn resolve(
        &self,
        user_id: Uuid,
        organization_id: Option<Uuid>,
    ) -> WardenResult<TenantContext> {
        // 1-2. Cache. The ticket is taken before any store read.
        let key = CacheKey::new(user_id, organization_id);
        let ticket = self.cache.ticket();
        if let Some(context) = self.cache.get(&key) {
            return Ok(context);
        }

        // 3. Default organization.
        let organization_id = match organization_id {
            Some(id) => id,
            None => self.default_organization(user_id).await?,
        };

        // 4. Organization.
        let organization = match self.directory.by_id(organization_id).await {
            Ok(org) => org,
            Err(err) if err.is_not_found() => {
                return Err(WardenError::NoSuchOrganization {
                    reference: organization_id.to_string(),
                });
            }
            Err(err) => return Err(err),
        };

        // 5. Membership.
        let not_a_member = || WardenError::NotAMember {
            user_id,
            organization_id: Some(organization_id),
        };
        let membership = match self.memberships.get(user_id, organization_id).await {
            Ok(m) if m.is_active() => m,
            Ok(m) => {
                debug!(
                    user_id = %user_id,
                    organization_id = %organization_id,
                    status = m.status.as_str(),
                    "Membership is not active"
                );
                return Err(not_a_member());
            }
            Err(err) if err.is_not_found() => return Err(not_a_member()),
            Err(err) => return Err(err),
        };

        // 6. Permissions, flags, quotas.
        let permissions = derive(membership.role, &membership.custom_permissions);
        let feature_flags = organization.effective_feature_flags();
        let quotas = QuotaSnapshot::of(&organization);

        // 7. Assemble and cache.
        let context = TenantContext {
            organization,
            membership,
            permissions,
            feature_flags,
            quotas,
        };
        self.cache.put_if_current(ticket, key, context.clone());
        debug!(
            user_id = %user_id,
            organization_id = %organization_id,
            role = context.role().as_str(),
            "Tenant context resolved"
        );
        Ok(context)
    }

    /// [`resolve`](Self::resolve) bounded by `deadline`. On expiry the
    /// in-flight store call is abandoned and nothing is cached.
    pub async fn resolve_with_deadline(
        &self,
        user_id: Uuid,
        organization_id: Option<Uuid>,
        deadline: Instant,
    ) -> WardenResult<TenantContext> {
        match tokio::time::timeout_at(deadline, self.resolve(user_id, organization_id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(user_id = %user_id, "Tenant resolution hit its deadline");
                Err(WardenError::DeadlineExceeded)
            }
        }
    }

    /// Authorization check on an already resolved context. Unknown
    /// capability names are denied.
    pub fn has_permission(&self, context: &TenantContext, capability: &str) -> bool {
        warden_core::has_permission(context, capability)
    }

    async fn default_organization(&self, user_id: Uuid) -> WardenResult<Uuid> {
        let memberships = self.memberships.list_active_for_user(user_id).await?;
        memberships
            .first()
            .map(|m| m.organization_id)
            .ok_or(WardenError::NotAMember {
                user_id,
                organization_id: None,
            })
    }
}
