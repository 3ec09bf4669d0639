//! Database-specific error types and conversions.

use surrealdb_types::QueryError;
use warden_core::error::WardenError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Statement on {entity} rejected: {message}")]
    Rejected { entity: String, message: String },

    #[error("Unique constraint violated on {entity}: {message}")]
    Duplicate { entity: String, message: String },

    #[error("{field} is out of range for the store: {value}")]
    OutOfRange { field: String, value: u64 },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Malformed {entity} row: {message}")]
    Decode { entity: String, message: String },

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

/// Failures worth retrying: the store could not be reached, or the
/// statement did not run to completion.
fn is_transient(err: &surrealdb::Error) -> bool {
    if err.is_connection() {
        return true;
    }
    matches!(
        err.query_details(),
        Some(
            QueryError::TimedOut { .. }
                | QueryError::Cancelled
                | QueryError::TransactionConflict
                | QueryError::NotExecuted
        )
    )
}

impl DbError {
    /// Classify an error returned by `Response::check` or
    /// `Response::take`.
    ///
    /// Unique index violations become [`DbError::Duplicate`], row
    /// deserialization failures [`DbError::Decode`]. Transport failures
    /// and interrupted statements stay [`DbError::Surreal`]; every other
    /// statement failure is a permanent [`DbError::Rejected`].
    pub(crate) fn from_response(entity: &str, err: surrealdb::Error) -> Self {
        let message = err.to_string();
        if err.is_already_exists()
            || message.contains("already contains")
            || message.contains("already exists")
        {
            DbError::Duplicate {
                entity: entity.into(),
                message,
            }
        } else if err.is_serialization() {
            DbError::Decode {
                entity: entity.into(),
                message,
            }
        } else if is_transient(&err) {
            DbError::Surreal(err)
        } else {
            DbError::Rejected {
                entity: entity.into(),
                message,
            }
        }
    }

    pub(crate) fn decode(entity: &str, message: impl Into<String>) -> Self {
        DbError::Decode {
            entity: entity.into(),
            message: message.into(),
        }
    }
}

/// SurrealDB integers are signed 64-bit.
pub(crate) fn store_int(field: &str, value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::OutOfRange {
        field: field.into(),
        value,
    })
}

impl From<DbError> for WardenError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => WardenError::NotFound { entity, id },
            DbError::Duplicate { entity, .. } => WardenError::AlreadyExists { entity },
            DbError::Surreal(e) if is_transient(&e) => WardenError::StoreUnavailable(e.to_string()),
            DbError::Surreal(e) if e.is_validation() || e.is_thrown() => WardenError::Validation {
                message: e.to_string(),
            },
            other @ DbError::OutOfRange { .. } => WardenError::Validation {
                message: other.to_string(),
            },
            other @ (DbError::Surreal(_)
            | DbError::Rejected { .. }
            | DbError::Migration(_)
            | DbError::Decode { .. }) => WardenError::Internal(other.to_string()),
        }
    }
}
