//! Engine configuration.

use serde::Deserialize;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::record::is_identifier;

/// Tables reachable through the query gateway unless configured
/// otherwise.
pub const DEFAULT_TENANT_TABLES: &[&str] =
    &["property", "claim", "claim_document", "policy", "ai_request"];

/// Longest accepted TTL for cached contexts and invitations: ten years.
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Configuration for the resolver, cache, gateway and administration
/// services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lifetime of a cached tenant context in seconds (default: 900 = 15
    /// minutes).
    pub context_ttl_secs: u64,
    /// Tenant-owned tables the gateway may touch.
    pub tenant_tables: Vec<String>,
    /// Invitation token lifetime in seconds (default: 604_800 = 7 days).
    pub invitation_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context_ttl_secs: 900,
            tenant_tables: DEFAULT_TENANT_TABLES.iter().map(|t| t.to_string()).collect(),
            invitation_ttl_secs: 604_800,
        }
    }
}

impl EngineConfig {
    /// Reject TTLs the clock arithmetic cannot represent and table names
    /// that are not plain identifiers.
    pub fn validate(&self) -> WardenResult<()> {
        for (name, value) in [
            ("context_ttl_secs", self.context_ttl_secs),
            ("invitation_ttl_secs", self.invitation_ttl_secs),
        ] {
            if value > MAX_TTL_SECS {
                return Err(WardenError::validation(format!(
                    "{name} = {value} exceeds the maximum of {MAX_TTL_SECS}"
                )));
            }
        }
        if let Some(table) = self.tenant_tables.iter().find(|t| !is_identifier(t)) {
            return Err(WardenError::validation(format!(
                "invalid tenant table name: {table:?}"
            )));
        }
        Ok(())
    }
}
