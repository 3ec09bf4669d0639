//! Configuration file for the `warden` binary.
//!
//! ```toml
//! log_filter = "warden=debug"
//!
//! [database]
//! endpoint = "ws://127.0.0.1:8000"
//! namespace = "warden"
//! database = "main"
//!
//! [engine]
//! context_ttl_secs = 900
//! ```

use std::path::Path;

use serde::Deserialize;
use warden_db::DbConfig;
use warden_engine::EngineConfig;

use crate::error::CliError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Default tracing directive, used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub database: DbConfig,
    pub engine: EngineConfig,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            log_filter: "warden=info".into(),
            database: DbConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl WardenConfig {
    /// Load `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| CliError::ParseConfig {
            path: path.display().to_string(),
            source,
        })?;
        config.engine.validate()?;
        Ok(config)
    }
}
