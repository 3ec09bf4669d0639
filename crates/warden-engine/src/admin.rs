//! Tenant administration: organization bootstrap, membership lifecycle
//! and organization settings.
//!
//! Every mutation that takes an `actor` requires a capability in the
//! actor's resolved context and acts on the actor's organization. Each
//! one ends by invalidating the cached contexts it may have changed:
//! membership changes drop the affected user's entries, organization
//! changes drop every entry of the organization.
//!
//! Memberships are the record of who belongs to an organization; the
//! users counter follows them. Once a membership write has committed,
//! a failed counter update is logged as drift and left for
//! `QuotaTracker::reconcile_usage`, and the operation still succeeds.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::context::TenantContext;
use warden_core::models::membership::{
    CreateMembership, Invitation, MemberRole, Membership, MembershipStatus, UpdateMembership,
};
use warden_core::models::organization::{
    ComplianceSettings, CreateOrganization, Organization, Resource, ResourceLimits,
    SecuritySettings, SubscriptionStatus, SubscriptionTier, UpdateOrganization,
};
use warden_core::models::permission::Capability;
use warden_core::models::quota::QuotaSnapshot;
use warden_core::repository::{MembershipRepository, OrganizationRepository};

use crate::cache::ContextCache;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::invitation;
use crate::quota::QuotaTracker;

/// Input for bootstrapping an organization. Limits and feature flags
/// come from the tier.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrganization {
    pub code: String,
    pub name: String,
    pub primary_domain: String,
    #[serde(default)]
    pub additional_domains: Vec<String>,
    pub tier: SubscriptionTier,
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
}

impl NewOrganization {
    fn validate(&self) -> WardenResult<()> {
        if self.code.trim().is_empty() {
            return Err(WardenError::validation("organization code is required"));
        }
        if self.name.trim().is_empty() {
            return Err(WardenError::validation("organization name is required"));
        }
        if !self.primary_domain.contains('.') {
            return Err(WardenError::validation(format!(
                "invalid primary domain: {}",
                self.primary_domain
            )));
        }
        Ok(())
    }
}

/// Administration service.
///
/// Generic over repository implementations so that the engine has no
/// dependency on the database crate.
pub struct TenantAdmin<O: OrganizationRepository + Clone, M: MembershipRepository> {
    organizations: O,
    memberships: M,
    quota: QuotaTracker<O>,
    cache: Arc<ContextCache>,
    config: EngineConfig,
}

fn require(actor: &TenantContext, capability: Capability) -> Result<(), EngineError> {
    if actor.can(capability) {
        Ok(())
    } else {
        warn!(
            user_id = %actor.user_id(),
            organization_id = %actor.organization_id(),
            capability = capability.as_str(),
            "Administrative action denied"
        );
        Err(EngineError::MissingCapability(capability))
    }
}

/// Only owners may hand out or take away the owner role.
fn require_owner_for(actor: &TenantContext, roles: &[MemberRole]) -> Result<(), EngineError> {
    if roles.contains(&MemberRole::Owner) && actor.role() != MemberRole::Owner {
        return Err(EngineError::OwnerOnly);
    }
    Ok(())
}

impl<O: OrganizationRepository + Clone, M: MembershipRepository> TenantAdmin<O, M> {
    pub fn new(
        organizations: O,
        memberships: M,
        cache: Arc<ContextCache>,
        config: EngineConfig,
    ) -> Self {
        Self {
            quota: QuotaTracker::new(organizations.clone()),
            organizations,
            memberships,
            cache,
            config,
        }
    }

    pub fn quota(&self) -> &QuotaTracker<O> {
        &self.quota
    }

    /// Create an organization on its tier defaults together with its
    /// owner membership.
    pub async fn initialize_organization(
        &self,
        input: NewOrganization,
        owner_user_id: Uuid,
    ) -> WardenResult<(Organization, Membership)> {
        input.validate()?;

        let organization = self
            .organizations
            .create(CreateOrganization {
                code: input.code,
                name: input.name,
                primary_domain: input.primary_domain,
                additional_domains: input.additional_domains,
                tier: input.tier,
                subscription_status: SubscriptionStatus::Active,
                limits: input.tier.default_limits(),
                settings: input.settings,
                feature_flags: input.tier.default_feature_flags(),
                security: SecuritySettings::default(),
                compliance: ComplianceSettings::default(),
            })
            .await?;

        let owner = self
            .memberships
            .create(CreateMembership {
                user_id: owner_user_id,
                organization_id: organization.id,
                role: MemberRole::Owner,
                status: MembershipStatus::Active,
                custom_permissions: vec![],
                invitation: None,
                invited_by: None,
            })
            .await?;

        let organization = match self
            .organizations
            .set_usage(organization.id, Resource::Users, 1)
            .await
        {
            Ok(updated) => updated,
            Err(err) => {
                warn!(
                    organization_id = %organization.id,
                    error = %err,
                    "Users counter not initialized; reconcile it"
                );
                organization
            }
        };

        self.cache.invalidate_user(owner_user_id);
        info!(
            organization_id = %organization.id,
            code = %organization.code,
            tier = organization.tier.as_str(),
            owner = %owner_user_id,
            "Organization initialized"
        );
        Ok((organization, owner))
    }

    /// Add `user_id` as an active member, or reactivate a previous
    /// membership. The user quota is checked before anything is written.
    pub async fn add_member(
        &self,
        actor: &TenantContext,
        user_id: Uuid,
        role: MemberRole,
    ) -> WardenResult<Membership> {
        require(actor, Capability::UsersInvite)?;
        require_owner_for(actor, &[role])?;
        let organization_id = actor.organization_id();

        let existing = self.find_membership(user_id, organization_id).await?;
        if existing.as_ref().is_some_and(Membership::is_active) {
            return Err(WardenError::AlreadyExists {
                entity: "organization_membership".into(),
            });
        }
        self.ensure_user_capacity(organization_id).await?;

        let membership = match existing {
            Some(_) => {
                self.memberships
                    .update(
                        user_id,
                        organization_id,
                        UpdateMembership {
                            role: Some(role),
                            status: Some(MembershipStatus::Active),
                            invitation: Some(None),
                            invited_by: Some(Some(actor.user_id())),
                            joined_at: Some(Utc::now()),
                            deactivated_by: Some(None),
                            deactivated_at: Some(None),
                            ..Default::default()
                        },
                    )
                    .await?
            }
            None => {
                self.memberships
                    .create(CreateMembership {
                        user_id,
                        organization_id,
                        role,
                        status: MembershipStatus::Active,
                        custom_permissions: vec![],
                        invitation: None,
                        invited_by: Some(actor.user_id()),
                    })
                    .await?
            }
        };
        self.track_users(organization_id, 1).await;

        self.cache.invalidate_user(user_id);
        info!(
            organization_id = %organization_id,
            user_id = %user_id,
            role = role.as_str(),
            actor = %actor.user_id(),
            "Member added"
        );
        Ok(membership)
    }

    /// Create a pending invitation and return the raw token. Only its
    /// hash is stored.
    pub async fn invite_member(
        &self,
        actor: &TenantContext,
        user_id: Uuid,
        role: MemberRole,
    ) -> WardenResult<String> {
        require(actor, Capability::UsersInvite)?;
        require_owner_for(actor, &[role])?;
        let organization_id = actor.organization_id();

        let existing = self.find_membership(user_id, organization_id).await?;
        if existing.as_ref().is_some_and(Membership::is_active) {
            return Err(WardenError::AlreadyExists {
                entity: "organization_membership".into(),
            });
        }

        let ttl_secs = self.config.invitation_ttl_secs;
        let expires_at = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| {
                WardenError::validation(format!("invitation TTL out of range: {ttl_secs}s"))
            })?;

        let token = invitation::generate_invitation_token();
        let pending = Invitation {
            token_hash: invitation::hash_invitation_token(&token),
            expires_at,
        };

        match existing {
            Some(_) => {
                self.memberships
                    .update(
                        user_id,
                        organization_id,
                        UpdateMembership {
                            role: Some(role),
                            status: Some(MembershipStatus::Invited),
                            invitation: Some(Some(pending)),
                            invited_by: Some(Some(actor.user_id())),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
            None => {
                self.memberships
                    .create(CreateMembership {
                        user_id,
                        organization_id,
                        role,
                        status: MembershipStatus::Invited,
                        custom_permissions: vec![],
                        invitation: Some(pending),
                        invited_by: Some(actor.user_id()),
                    })
                    .await?;
            }
        }

        self.cache.invalidate_user(user_id);
        info!(
            organization_id = %organization_id,
            user_id = %user_id,
            role = role.as_str(),
            actor = %actor.user_id(),
            "Member invited"
        );
        Ok(token)
    }

    /// Activate an invited membership with its raw token.
    pub async fn accept_invitation(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        token: &str,
    ) -> WardenResult<Membership> {
        let membership = self
            .find_membership(user_id, organization_id)
            .await?
            .ok_or(EngineError::NoPendingInvitation)?;
        let pending = match (&membership.status, &membership.invitation) {
            (MembershipStatus::Invited, Some(pending)) => pending,
            _ => return Err(EngineError::NoPendingInvitation.into()),
        };
        if pending.token_hash != invitation::hash_invitation_token(token) {
            return Err(EngineError::InvitationMismatch.into());
        }
        if pending.expires_at <= Utc::now() {
            return Err(EngineError::InvitationExpired(pending.expires_at).into());
        }

        self.ensure_user_capacity(organization_id).await?;
        let membership = self
            .memberships
            .update(
                user_id,
                organization_id,
                UpdateMembership {
                    status: Some(MembershipStatus::Active),
                    invitation: Some(None),
                    joined_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        self.track_users(organization_id, 1).await;

        self.cache.invalidate_user(user_id);
        info!(
            organization_id = %organization_id,
            user_id = %user_id,
            "Invitation accepted"
        );
        Ok(membership)
    }

    pub async fn set_role(
        &self,
        actor: &TenantContext,
        user_id: Uuid,
        role: MemberRole,
    ) -> WardenResult<Membership> {
        require(actor, Capability::UsersUpdate)?;
        let organization_id = actor.organization_id();
        let current = self.member(user_id, organization_id).await?;
        require_owner_for(actor, &[role, current.role])?;

        let membership = self
            .memberships
            .update(
                user_id,
                organization_id,
                UpdateMembership {
                    role: Some(role),
                    ..Default::default()
                },
            )
            .await?;

        self.cache.invalidate_user(user_id);
        info!(
            organization_id = %organization_id,
            user_id = %user_id,
            from = current.role.as_str(),
            to = role.as_str(),
            actor = %actor.user_id(),
            "Member role changed"
        );
        Ok(membership)
    }

    /// Grant one extra capability on top of the member's role. Actors can
    /// only grant what they hold themselves.
    pub async fn add_override(
        &self,
        actor: &TenantContext,
        user_id: Uuid,
        capability: Capability,
    ) -> WardenResult<Membership> {
        require(actor, Capability::UsersUpdate)?;
        require(actor, capability)?;
        let organization_id = actor.organization_id();
        let current = self.member(user_id, organization_id).await?;

        if current.custom_permissions.iter().any(|c| c == capability.as_str()) {
            return Ok(current);
        }
        let mut custom_permissions = current.custom_permissions;
        custom_permissions.push(capability.as_str().to_string());

        let membership = self
            .memberships
            .update(
                user_id,
                organization_id,
                UpdateMembership {
                    custom_permissions: Some(custom_permissions),
                    ..Default::default()
                },
            )
            .await?;

        self.cache.invalidate_user(user_id);
        info!(
            organization_id = %organization_id,
            user_id = %user_id,
            capability = capability.as_str(),
            actor = %actor.user_id(),
            "Capability override granted"
        );
        Ok(membership)
    }

    /// Deactivate an active membership, or withdraw a pending invitation.
    pub async fn deactivate_membership(
        &self,
        actor: &TenantContext,
        user_id: Uuid,
    ) -> WardenResult<Membership> {
        require(actor, Capability::UsersDelete)?;
        let organization_id = actor.organization_id();
        let current = self
            .find_membership(user_id, organization_id)
            .await?
            .filter(|m| m.status != MembershipStatus::Deactivated)
            .ok_or(WardenError::NotAMember {
                user_id,
                organization_id: Some(organization_id),
            })?;
        require_owner_for(actor, &[current.role])?;

        let membership = self
            .memberships
            .update(
                user_id,
                organization_id,
                UpdateMembership {
                    status: Some(MembershipStatus::Deactivated),
                    invitation: Some(None),
                    deactivated_by: Some(Some(actor.user_id())),
                    deactivated_at: Some(Some(Utc::now())),
                    ..Default::default()
                },
            )
            .await?;
        if current.is_active() {
            self.track_users(organization_id, -1).await;
        }

        self.cache.invalidate_user(user_id);
        info!(
            organization_id = %organization_id,
            user_id = %user_id,
            actor = %actor.user_id(),
            "Membership deactivated"
        );
        Ok(membership)
    }

    /// Replace the organization's limits. Lowering a limit below current
    /// usage is allowed; the violation is logged.
    pub async fn update_limits(
        &self,
        actor: &TenantContext,
        limits: ResourceLimits,
    ) -> WardenResult<Organization> {
        require(actor, Capability::BillingManage)?;
        let organization = self
            .update_organization(
                actor,
                UpdateOrganization {
                    limits: Some(limits),
                    ..Default::default()
                },
            )
            .await?;

        for entry in QuotaSnapshot::of(&organization).violations() {
            warn!(
                organization_id = %organization.id,
                resource = %entry.resource,
                limit = entry.limit,
                current = entry.current,
                "Limit set below current usage"
            );
        }
        info!(organization_id = %organization.id, actor = %actor.user_id(), "Limits updated");
        Ok(organization)
    }

    /// Merge `flags` into the organization's own feature flags.
    pub async fn update_feature_flags(
        &self,
        actor: &TenantContext,
        flags: BTreeMap<String, bool>,
    ) -> WardenResult<Organization> {
        require(actor, Capability::SettingsManage)?;
        let current = self
            .organizations
            .get_by_id(actor.organization_id())
            .await?;
        let mut merged = current.feature_flags;
        merged.extend(flags);

        let organization = self
            .update_organization(
                actor,
                UpdateOrganization {
                    feature_flags: Some(merged),
                    ..Default::default()
                },
            )
            .await?;
        info!(organization_id = %organization.id, actor = %actor.user_id(), "Feature flags updated");
        Ok(organization)
    }

    pub async fn update_settings(
        &self,
        actor: &TenantContext,
        settings: serde_json::Value,
    ) -> WardenResult<Organization> {
        require(actor, Capability::SettingsManage)?;
        if !settings.is_object() {
            return Err(WardenError::validation("settings must be an object"));
        }
        let organization = self
            .update_organization(
                actor,
                UpdateOrganization {
                    settings: Some(settings),
                    ..Default::default()
                },
            )
            .await?;
        info!(organization_id = %organization.id, actor = %actor.user_id(), "Settings updated");
        Ok(organization)
    }

    /// Soft-delete the organization. Its rows stay in place but it no
    /// longer resolves.
    pub async fn deactivate_organization(&self, actor: &TenantContext) -> WardenResult<Organization> {
        require(actor, Capability::OrganizationDeactivate)?;
        let organization = self
            .update_organization(
                actor,
                UpdateOrganization {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        info!(organization_id = %organization.id, actor = %actor.user_id(), "Organization deactivated");
        Ok(organization)
    }

    async fn update_organization(
        &self,
        actor: &TenantContext,
        input: UpdateOrganization,
    ) -> WardenResult<Organization> {
        let organization_id = actor.organization_id();
        let organization = self.organizations.update(organization_id, input).await?;
        self.cache.invalidate_organization(organization_id);
        Ok(organization)
    }

    /// Follow a committed membership change with the users counter.
    async fn track_users(&self, organization_id: Uuid, delta: i64) {
        if let Err(err) = self
            .quota
            .record_usage_delta(organization_id, Resource::Users, delta)
            .await
        {
            warn!(
                organization_id = %organization_id,
                delta,
                error = %err,
                "Users counter drifted from memberships; reconcile it"
            );
        }
    }

    async fn ensure_user_capacity(&self, organization_id: Uuid) -> WardenResult<()> {
        let entry = self.quota.usage(organization_id, Resource::Users).await?;
        if entry.has_room() {
            Ok(())
        } else {
            Err(EngineError::QuotaReached(entry).into())
        }
    }

    async fn find_membership(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> WardenResult<Option<Membership>> {
        match self.memberships.get(user_id, organization_id).await {
            Ok(m) => Ok(Some(m)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// The membership of a current (active) member.
    async fn member(&self, user_id: Uuid, organization_id: Uuid) -> WardenResult<Membership> {
        self.find_membership(user_id, organization_id)
            .await?
            .filter(Membership::is_active)
            .ok_or(WardenError::NotAMember {
                user_id,
                organization_id: Some(organization_id),
            })
    }
}
