//! Errors surfaced by the `warden` binary.

use thiserror::Error;
use warden_core::error::WardenError;
use warden_db::DbError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot read {path}: {source}")]
    ReadConfig {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ParseConfig {
        path: String,
        source: toml::de::Error,
    },

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Warden(#[from] WardenError),

    #[error("cannot encode output: {0}")]
    Output(#[from] serde_json::Error),
}
