//! Engine error types.

use chrono::{DateTime, Utc};
use thiserror::Error;
use warden_core::error::WardenError;
use warden_core::models::permission::Capability;
use warden_core::models::quota::QuotaEntry;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("table is not on the tenant allow-list: {0}")]
    UnknownTable(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("missing capability: {0}")]
    MissingCapability(Capability),

    #[error("only an owner may grant or revoke the owner role")]
    OwnerOnly,

    #[error("no pending invitation")]
    NoPendingInvitation,

    #[error("invitation token does not match")]
    InvitationMismatch,

    #[error("invitation expired at {0}")]
    InvitationExpired(DateTime<Utc>),

    #[error("quota reached for {}", .0.resource)]
    QuotaReached(QuotaEntry),
}

impl From<EngineError> for WardenError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::UnknownTable(table) => WardenError::InvalidTable(table),
            EngineError::InvalidIdentifier(_) => WardenError::Validation {
                message: err.to_string(),
            },
            EngineError::MissingCapability(capability) => WardenError::PermissionDenied {
                capability: capability.as_str().to_string(),
            },
            EngineError::OwnerOnly => WardenError::PermissionDenied {
                capability: "owner role".into(),
            },
            EngineError::NoPendingInvitation
            | EngineError::InvitationMismatch
            | EngineError::InvitationExpired(_) => WardenError::InvalidInvitation,
            EngineError::QuotaReached(entry) => WardenError::QuotaExceeded {
                resource: entry.resource.as_str().to_string(),
                limit: entry.limit,
                current: entry.current,
            },
        }
    }
}
