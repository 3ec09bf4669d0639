//! Organization membership domain model.
//!
//! A membership binds a user to an organization with a role. There is
//! at most one membership row per (user, organization) pair; leaving an
//! organization flips the status to `Deactivated` rather than deleting
//! the row.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WardenError;

/// Organization-scoped role. Declaration order is rank order
/// (`Owner` highest).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberRole {
    Owner,
    Admin,
    Manager,
    Member,
    Viewer,
}

impl MemberRole {
    pub const ALL: [MemberRole; 5] = [
        MemberRole::Owner,
        MemberRole::Admin,
        MemberRole::Manager,
        MemberRole::Member,
        MemberRole::Viewer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Admin => "admin",
            MemberRole::Manager => "manager",
            MemberRole::Member => "member",
            MemberRole::Viewer => "viewer",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MemberRole::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| WardenError::validation(format!("unknown member role: {s}")))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MembershipStatus {
    Invited,
    Active,
    Suspended,
    Deactivated,
}

impl MembershipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MembershipStatus::Invited => "Invited",
            MembershipStatus::Active => "Active",
            MembershipStatus::Suspended => "Suspended",
            MembershipStatus::Deactivated => "Deactivated",
        }
    }
}

impl FromStr for MembershipStatus {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Invited" => Ok(MembershipStatus::Invited),
            "Active" => Ok(MembershipStatus::Active),
            "Suspended" => Ok(MembershipStatus::Suspended),
            "Deactivated" => Ok(MembershipStatus::Deactivated),
            other => Err(WardenError::validation(format!(
                "unknown membership status: {other}"
            ))),
        }
    }
}

/// Pending invitation attached to an `Invited` membership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invitation {
    /// SHA-256 of the raw token; the raw token is only handed to the
    /// inviter.
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Membership {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: MemberRole,
    pub status: MembershipStatus,
    /// Additive capability grants layered on top of the role.
    pub custom_permissions: Vec<String>,
    pub invitation: Option<Invitation>,
    pub invited_by: Option<Uuid>,
    pub joined_at: DateTime<Utc>,
    pub deactivated_by: Option<Uuid>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }
}

/// Fields required to create a membership row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMembership {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: MemberRole,
    pub status: MembershipStatus,
    pub custom_permissions: Vec<String>,
    pub invitation: Option<Invitation>,
    pub invited_by: Option<Uuid>,
}

/// Fields that can be updated on an existing membership.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateMembership {
    pub role: Option<MemberRole>,
    pub status: Option<MembershipStatus>,
    pub custom_permissions: Option<Vec<String>>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub invitation: Option<Option<Invitation>>,
    pub invited_by: Option<Option<Uuid>>,
    /// Reset the join date (used when an invitation is accepted or a
    /// deactivated member is re-added).
    pub joined_at: Option<DateTime<Utc>>,
    pub deactivated_by: Option<Option<Uuid>>,
    pub deactivated_at: Option<Option<DateTime<Utc>>>,
}
