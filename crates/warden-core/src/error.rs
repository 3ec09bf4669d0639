//! Error types for the Warden tenant engine.
//!
//! Resolution failures are split into organization problems
//! ([`WardenError::NoSuchOrganization`]) and membership problems
//! ([`WardenError::NotAMember`]) so callers can render different
//! messages. Store failures are transient and never cached.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WardenError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("No such organization: {reference}")]
    NoSuchOrganization { reference: String },

    #[error("User {user_id} is not an active member of {}", organization_label(.organization_id))]
    NotAMember {
        user_id: Uuid,
        organization_id: Option<Uuid>,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Table is not tenant-scoped: {0}")]
    InvalidTable(String),

    #[error("Quota exceeded for {resource}: {current} of {limit} in use")]
    QuotaExceeded {
        resource: String,
        limit: u64,
        current: u64,
    },

    #[error("Permission denied: {capability} is required")]
    PermissionDenied { capability: String },

    #[error("Invitation is invalid or has expired")]
    InvalidInvitation,

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Deadline exceeded while waiting on the store")]
    DeadlineExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

fn organization_label(organization_id: &Option<Uuid>) -> String {
    match organization_id {
        Some(id) => format!("organization {id}"),
        None => "any organization".into(),
    }
}

impl WardenError {
    /// Whether the caller may retry the operation (with backoff).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WardenError::StoreUnavailable(_) | WardenError::DeadlineExceeded
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, WardenError::NotFound { .. })
    }

    pub fn validation(message: impl Into<String>) -> Self {
        WardenError::Validation {
            message: message.into(),
        }
    }
}

pub type WardenResult<T> = Result<T, WardenError>;
