//! Capabilities and the role → capability table.
//!
//! Every role lists its capabilities explicitly. Roles do not inherit
//! from each other, so adding a capability to `Admin` never silently
//! widens `Manager`. Per-member overrides are additive only.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::WardenError;
use crate::models::membership::MemberRole;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    #[serde(rename = "organization.view")]
    OrganizationView,
    #[serde(rename = "organization.update")]
    OrganizationUpdate,
    #[serde(rename = "organization.deactivate")]
    OrganizationDeactivate,
    #[serde(rename = "users.view")]
    UsersView,
    #[serde(rename = "users.invite")]
    UsersInvite,
    #[serde(rename = "users.update")]
    UsersUpdate,
    #[serde(rename = "users.delete")]
    UsersDelete,
    #[serde(rename = "billing.view")]
    BillingView,
    #[serde(rename = "billing.manage")]
    BillingManage,
    #[serde(rename = "properties.view")]
    PropertiesView,
    #[serde(rename = "properties.create")]
    PropertiesCreate,
    #[serde(rename = "properties.update")]
    PropertiesUpdate,
    #[serde(rename = "properties.delete")]
    PropertiesDelete,
    #[serde(rename = "claims.view")]
    ClaimsView,
    #[serde(rename = "claims.create")]
    ClaimsCreate,
    #[serde(rename = "claims.update")]
    ClaimsUpdate,
    #[serde(rename = "claims.delete")]
    ClaimsDelete,
    #[serde(rename = "claims.approve")]
    ClaimsApprove,
    #[serde(rename = "documents.view")]
    DocumentsView,
    #[serde(rename = "documents.upload")]
    DocumentsUpload,
    #[serde(rename = "documents.delete")]
    DocumentsDelete,
    #[serde(rename = "ai.use")]
    AiUse,
    #[serde(rename = "ai.configure")]
    AiConfigure,
    #[serde(rename = "reports.view")]
    ReportsView,
    #[serde(rename = "reports.export")]
    ReportsExport,
    #[serde(rename = "settings.view")]
    SettingsView,
    #[serde(rename = "settings.manage")]
    SettingsManage,
    #[serde(rename = "audit.view")]
    AuditView,
}

impl Capability {
    pub const ALL: [Capability; 28] = [
        Capability::OrganizationView,
        Capability::OrganizationUpdate,
        Capability::OrganizationDeactivate,
        Capability::UsersView,
        Capability::UsersInvite,
        Capability::UsersUpdate,
        Capability::UsersDelete,
        Capability::BillingView,
        Capability::BillingManage,
        Capability::PropertiesView,
        Capability::PropertiesCreate,
        Capability::PropertiesUpdate,
        Capability::PropertiesDelete,
        Capability::ClaimsView,
        Capability::ClaimsCreate,
        Capability::ClaimsUpdate,
        Capability::ClaimsDelete,
        Capability::ClaimsApprove,
        Capability::DocumentsView,
        Capability::DocumentsUpload,
        Capability::DocumentsDelete,
        Capability::AiUse,
        Capability::AiConfigure,
        Capability::ReportsView,
        Capability::ReportsExport,
        Capability::SettingsView,
        Capability::SettingsManage,
        Capability::AuditView,
    ];

    /// Wire name, e.g. `users.invite`.
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::OrganizationView => "organization.view",
            Capability::OrganizationUpdate => "organization.update",
            Capability::OrganizationDeactivate => "organization.deactivate",
            Capability::UsersView => "users.view",
            Capability::UsersInvite => "users.invite",
            Capability::UsersUpdate => "users.update",
            Capability::UsersDelete => "users.delete",
            Capability::BillingView => "billing.view",
            Capability::BillingManage => "billing.manage",
            Capability::PropertiesView => "properties.view",
            Capability::PropertiesCreate => "properties.create",
            Capability::PropertiesUpdate => "properties.update",
            Capability::PropertiesDelete => "properties.delete",
            Capability::ClaimsView => "claims.view",
            Capability::ClaimsCreate => "claims.create",
            Capability::ClaimsUpdate => "claims.update",
            Capability::ClaimsDelete => "claims.delete",
            Capability::ClaimsApprove => "claims.approve",
            Capability::DocumentsView => "documents.view",
            Capability::DocumentsUpload => "documents.upload",
            Capability::DocumentsDelete => "documents.delete",
            Capability::AiUse => "ai.use",
            Capability::AiConfigure => "ai.configure",
            Capability::ReportsView => "reports.view",
            Capability::ReportsExport => "reports.export",
            Capability::SettingsView => "settings.view",
            Capability::SettingsManage => "settings.manage",
            Capability::AuditView => "audit.view",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| WardenError::validation(format!("unknown capability: {s}")))
    }
}

/// Base capabilities for a role. Kept in sync by hand.
pub fn role_capabilities(role: MemberRole) -> &'static [Capability] {
    use Capability::*;

    const OWNER: &[Capability] = &Capability::ALL;
    const ADMIN: &[Capability] = &[
        OrganizationView,
        OrganizationUpdate,
        UsersView,
        UsersInvite,
        UsersUpdate,
        UsersDelete,
        BillingView,
        PropertiesView,
        PropertiesCreate,
        PropertiesUpdate,
        PropertiesDelete,
        ClaimsView,
        ClaimsCreate,
        ClaimsUpdate,
        ClaimsDelete,
        ClaimsApprove,
        DocumentsView,
        DocumentsUpload,
        DocumentsDelete,
        AiUse,
        AiConfigure,
        ReportsView,
        ReportsExport,
        SettingsView,
        SettingsManage,
        AuditView,
    ];
    const MANAGER: &[Capability] = &[
        OrganizationView,
        UsersView,
        UsersInvite,
        PropertiesView,
        PropertiesCreate,
        PropertiesUpdate,
        PropertiesDelete,
        ClaimsView,
        ClaimsCreate,
        ClaimsUpdate,
        ClaimsApprove,
        DocumentsView,
        DocumentsUpload,
        DocumentsDelete,
        AiUse,
        ReportsView,
        ReportsExport,
        SettingsView,
    ];
    const MEMBER: &[Capability] = &[
        OrganizationView,
        UsersView,
        PropertiesView,
        PropertiesCreate,
        PropertiesUpdate,
        ClaimsView,
        ClaimsCreate,
        ClaimsUpdate,
        DocumentsView,
        DocumentsUpload,
        AiUse,
        ReportsView,
    ];
    const VIEWER: &[Capability] = &[
        OrganizationView,
        PropertiesView,
        ClaimsView,
        DocumentsView,
        ReportsView,
    ];

    match role {
        MemberRole::Owner => OWNER,
        MemberRole::Admin => ADMIN,
        MemberRole::Manager => MANAGER,
        MemberRole::Member => MEMBER,
        MemberRole::Viewer => VIEWER,
    }
}

/// Effective capabilities of a member. Ordered, so two sets built from
/// the same inputs compare and serialize identically.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Capability>);

impl PermissionSet {
    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// String form of [`contains`](Self::contains). Unknown names are
    /// never granted.
    pub fn allows(&self, capability: &str) -> bool {
        capability
            .parse::<Capability>()
            .is_ok_and(|c| self.contains(c))
    }

    pub fn is_superset(&self, other: &PermissionSet) -> bool {
        self.0.is_superset(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        PermissionSet(iter.into_iter().collect())
    }
}

/// Compute the effective permission set for `role` plus string
/// overrides as stored on the membership.
///
/// Unrecognised override names are skipped with a warning; they never
/// fail the derivation and never grant anything.
pub fn derive(role: MemberRole, overrides: &[String]) -> PermissionSet {
    let granted = overrides.iter().filter_map(|name| match name.parse() {
        Ok(capability) => Some(capability),
        Err(_) => {
            warn!(role = %role, capability = %name, "Ignoring unknown capability override");
            None
        }
    });
    derive_from(role, granted)
}

/// Typed variant of [`derive`].
pub fn derive_from(
    role: MemberRole,
    overrides: impl IntoIterator<Item = Capability>,
) -> PermissionSet {
    role_capabilities(role)
        .iter()
        .copied()
        .chain(overrides)
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn capability() -> impl Strategy<Value = Capability> {
        (0..Capability::ALL.len()).prop_map(|i| Capability::ALL[i])
    }

    fn role() -> impl Strategy<Value = MemberRole> {
        (0..MemberRole::ALL.len()).prop_map(|i| MemberRole::ALL[i])
    }

    fn override_names() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(
            prop_oneof![
                capability().prop_map(|c| c.as_str().to_string()),
                "[a-z]{1,8}\\.[a-z]{1,8}",
            ],
            0..8,
        )
    }

    proptest! {
        #[test]
        fn derive_is_deterministic(role in role(), overrides in override_names()) {
            let a = derive(role, &overrides);
            let b = derive(role, &overrides);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(
                serde_json::to_string(&a).unwrap(),
                serde_json::to_string(&b).unwrap()
            );
        }

        #[test]
        fn overrides_never_remove_capabilities(
            role in role(),
            overrides in override_names(),
            extra in capability(),
        ) {
            let base = derive(role, &overrides);
            let mut widened = overrides.clone();
            widened.push(extra.as_str().to_string());
            let grown = derive(role, &widened);
            prop_assert!(grown.is_superset(&base));
            prop_assert!(grown.contains(extra));
        }

        #[test]
        fn role_capabilities_are_always_granted(role in role(), overrides in override_names()) {
            let set = derive(role, &overrides);
            for capability in role_capabilities(role) {
                prop_assert!(set.contains(*capability));
            }
        }
    }

    #[test]
    fn member_with_billing_override() {
        let set = derive(MemberRole::Member, &["billing.view".to_string()]);
        assert!(set.allows("billing.view"));
        assert!(!set.allows("users.delete"));
    }

    #[test]
    fn viewer_admin_viewer_round_trip_leaks_nothing() {
        let original = derive(MemberRole::Viewer, &[]);
        let promoted = derive(MemberRole::Admin, &[]);
        let demoted = derive(MemberRole::Viewer, &[]);
        assert!(promoted.is_superset(&original));
        assert_eq!(original, demoted);
    }

    #[test]
    fn unknown_capability_is_denied() {
        let set = derive(MemberRole::Owner, &["root.everything".to_string()]);
        assert_eq!(set.len(), Capability::ALL.len());
        assert!(!set.allows("root.everything"));
    }

    #[test]
    fn only_owner_can_deactivate_or_manage_billing() {
        for role in MemberRole::ALL {
            let set = derive(role, &[]);
            let owner = role == MemberRole::Owner;
            assert_eq!(set.contains(Capability::OrganizationDeactivate), owner);
            assert_eq!(set.contains(Capability::BillingManage), owner);
        }
    }

    #[test]
    fn wire_names_match_serde_names() {
        for capability in Capability::ALL {
            let json = serde_json::to_value(capability).unwrap();
            assert_eq!(json, serde_json::Value::String(capability.as_str().into()));
        }
    }
}
