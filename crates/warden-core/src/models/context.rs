//! Resolved tenant context.
//!
//! A [`TenantContext`] is derived, never persisted. It is cached for a
//! bounded time, so it may trail out-of-band changes to the underlying
//! organization or membership until it expires or is invalidated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::membership::{MemberRole, Membership};
use crate::models::organization::Organization;
use crate::models::permission::{Capability, PermissionSet};
use crate::models::quota::QuotaSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TenantContext {
    pub organization: Organization,
    pub membership: Membership,
    pub permissions: PermissionSet,
    pub feature_flags: BTreeMap<String, bool>,
    pub quotas: QuotaSnapshot,
}

impl TenantContext {
    pub fn organization_id(&self) -> Uuid {
        self.organization.id
    }

    pub fn user_id(&self) -> Uuid {
        self.membership.user_id
    }

    pub fn role(&self) -> MemberRole {
        self.membership.role
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.permissions.contains(capability)
    }

    pub fn feature_enabled(&self, flag: &str) -> bool {
        self.feature_flags.get(flag).copied().unwrap_or(false)
    }
}

/// Authorization check used throughout the application.
///
/// Unknown capability names are denied.
pub fn has_permission(context: &TenantContext, capability: &str) -> bool {
    context.permissions.allows(capability)
}
