//! Schema definitions and migration runner for SurrealDB.
//!
//! Tables are SCHEMAFULL. UUIDs are stored as strings, enums as strings
//! guarded by ASSERT constraints. Usage counters carry a `>= 0` assert
//! as a last line of defence behind the guarded updates.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

/// Tenant-owned tables created by the schema. Each has
/// `organization_id`, a flexible `data` object and timestamps.
pub const TENANT_TABLES: &[&str] = &["property", "claim", "claim_document", "policy", "ai_request"];

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "organizations_and_memberships",
        sql: SCHEMA_V1,
    },
    Migration {
        version: 2,
        name: "tenant_owned_tables",
        sql: SCHEMA_V2,
    },
];

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Organizations (global scope, never hard-deleted)
-- =======================================================================
DEFINE TABLE organization SCHEMAFULL;
DEFINE FIELD code ON TABLE organization TYPE string;
DEFINE FIELD name ON TABLE organization TYPE string;
DEFINE FIELD primary_domain ON TABLE organization TYPE string;
DEFINE FIELD additional_domains ON TABLE organization TYPE array<string> \
    DEFAULT [];
DEFINE FIELD tier ON TABLE organization TYPE string \
    ASSERT $value IN ['Free', 'Starter', 'Professional', 'Enterprise'];
DEFINE FIELD subscription_status ON TABLE organization TYPE string \
    ASSERT $value IN ['Trialing', 'Active', 'PastDue', 'Canceled'];
DEFINE FIELD limit_users ON TABLE organization TYPE int ASSERT $value >= 0;
DEFINE FIELD limit_properties ON TABLE organization TYPE int ASSERT $value >= 0;
DEFINE FIELD limit_claims ON TABLE organization TYPE int ASSERT $value >= 0;
DEFINE FIELD limit_ai_requests ON TABLE organization TYPE int ASSERT $value >= 0;
DEFINE FIELD limit_storage_mb ON TABLE organization TYPE int ASSERT $value >= 0;
DEFINE FIELD current_users ON TABLE organization TYPE int DEFAULT 0 \
    ASSERT $value >= 0;
DEFINE FIELD current_properties ON TABLE organization TYPE int DEFAULT 0 \
    ASSERT $value >= 0;
DEFINE FIELD current_claims ON TABLE organization TYPE int DEFAULT 0 \
    ASSERT $value >= 0;
DEFINE FIELD current_ai_requests ON TABLE organization TYPE int DEFAULT 0 \
    ASSERT $value >= 0;
DEFINE FIELD current_storage_mb ON TABLE organization TYPE int DEFAULT 0 \
    ASSERT $value >= 0;
DEFINE FIELD settings ON TABLE organization TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD feature_flags ON TABLE organization TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD security ON TABLE organization TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD compliance ON TABLE organization TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD is_active ON TABLE organization TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE organization TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE organization TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_organization_code ON TABLE organization \
    COLUMNS code UNIQUE;
DEFINE INDEX idx_organization_primary_domain ON TABLE organization \
    COLUMNS primary_domain UNIQUE;

-- =======================================================================
-- Memberships (one row per user/organization pair; record id encodes
-- the pair, so at most one can be active)
-- =======================================================================
DEFINE TABLE organization_membership SCHEMAFULL;
DEFINE FIELD user_id ON TABLE organization_membership TYPE string;
DEFINE FIELD organization_id ON TABLE organization_membership TYPE string;
DEFINE FIELD role ON TABLE organization_membership TYPE string \
    ASSERT $value IN ['owner', 'admin', 'manager', 'member', 'viewer'];
DEFINE FIELD status ON TABLE organization_membership TYPE string \
    ASSERT $value IN ['Invited', 'Active', 'Suspended', 'Deactivated'];
DEFINE FIELD custom_permissions ON TABLE organization_membership \
    TYPE array<string> DEFAULT [];
DEFINE FIELD invitation_token_hash ON TABLE organization_membership \
    TYPE option<string>;
DEFINE FIELD invitation_expires_at ON TABLE organization_membership \
    TYPE option<datetime>;
DEFINE FIELD invited_by ON TABLE organization_membership TYPE option<string>;
DEFINE FIELD joined_at ON TABLE organization_membership TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD deactivated_by ON TABLE organization_membership \
    TYPE option<string>;
DEFINE FIELD deactivated_at ON TABLE organization_membership \
    TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE organization_membership TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE organization_membership TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_membership_user_status ON TABLE organization_membership \
    COLUMNS user_id, status;
DEFINE INDEX idx_membership_org_status ON TABLE organization_membership \
    COLUMNS organization_id, status;
";

const SCHEMA_V2: &str = "\
-- =======================================================================
-- Tenant-owned tables (reached only through the query gateway)
-- =======================================================================
DEFINE TABLE property SCHEMAFULL;
DEFINE FIELD organization_id ON TABLE property TYPE string;
DEFINE FIELD data ON TABLE property TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD created_at ON TABLE property TYPE datetime DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE property TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_property_org ON TABLE property COLUMNS organization_id;

DEFINE TABLE claim SCHEMAFULL;
DEFINE FIELD organization_id ON TABLE claim TYPE string;
DEFINE FIELD data ON TABLE claim TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD created_at ON TABLE claim TYPE datetime DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE claim TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_claim_org ON TABLE claim COLUMNS organization_id;

DEFINE TABLE claim_document SCHEMAFULL;
DEFINE FIELD organization_id ON TABLE claim_document TYPE string;
DEFINE FIELD data ON TABLE claim_document TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD created_at ON TABLE claim_document TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE claim_document TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_claim_document_org ON TABLE claim_document \
    COLUMNS organization_id;

DEFINE TABLE policy SCHEMAFULL;
DEFINE FIELD organization_id ON TABLE policy TYPE string;
DEFINE FIELD data ON TABLE policy TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD created_at ON TABLE policy TYPE datetime DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE policy TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_policy_org ON TABLE policy COLUMNS organization_id;

DEFINE TABLE ai_request SCHEMAFULL;
DEFINE FIELD organization_id ON TABLE ai_request TYPE string;
DEFINE FIELD data ON TABLE ai_request TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD created_at ON TABLE ai_request TYPE datetime DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE ai_request TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_ai_request_org ON TABLE ai_request COLUMNS organization_id;
";

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates the `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the recorded maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS
        .iter()
        .filter(|m| m.version > current_version)
    {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "Migration v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn every_tenant_table_is_defined_with_an_organization_index() {
        for table in TENANT_TABLES {
            assert!(SCHEMA_V2.contains(&format!("DEFINE TABLE {table} SCHEMAFULL")));
            assert!(SCHEMA_V2.contains(&format!("idx_{table}_org ON TABLE {table}")));
        }
    }
}
