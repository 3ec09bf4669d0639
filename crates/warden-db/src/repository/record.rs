//! SurrealDB implementation of [`TenantRecordRepository`].
//!
//! Every statement carries `organization_id = $org_id`. Table names are
//! passed through `type::table`/`type::record`; filter fields are checked
//! with [`is_identifier`] before they are spliced into the query text.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::record::{Filter, TenantRecord, is_identifier};
use warden_core::repository::TenantRecordRepository;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct RecordRow {
    organization_id: String,
    data: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct RecordRowWithId {
    record_id: String,
    organization_id: String,
    data: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RecordRow {
    fn into_record(self, table: &str, id: Uuid) -> Result<TenantRecord, DbError> {
        let organization_id = Uuid::parse_str(&self.organization_id)
            .map_err(|e| DbError::decode(table, format!("organization_id: {e}")))?;
        Ok(TenantRecord {
            id,
            organization_id,
            data: self.data,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl RecordRowWithId {
    fn into_record(self, table: &str) -> Result<TenantRecord, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::decode(table, format!("invalid UUID: {e}")))?;
        RecordRow {
            organization_id: self.organization_id,
            data: self.data,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_record(table, id)
    }
}

fn not_found(table: &str, id: Uuid) -> DbError {
    DbError::NotFound {
        entity: table.into(),
        id: id.to_string(),
    }
}

fn ensure_identifier(name: &str) -> WardenResult<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(WardenError::InvalidTable(name.to_string()))
    }
}

/// Build the WHERE clause for `filters`, numbering the bind parameters
/// `$f0`, `$f1`, ... in order.
fn filter_clause(filters: &[Filter]) -> WardenResult<String> {
    let mut clause = String::from("organization_id = $org_id");
    for (i, filter) in filters.iter().enumerate() {
        if !is_identifier(&filter.field) {
            return Err(WardenError::validation(format!(
                "invalid filter field: {}",
                filter.field
            )));
        }
        clause.push_str(&format!(
            " AND data.{} {} $f{i}",
            filter.field,
            filter.op.as_operator()
        ));
    }
    Ok(clause)
}

/// SurrealDB implementation of the tenant record repository.
#[derive(Clone)]
pub struct SurrealTenantRecordRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealTenantRecordRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> TenantRecordRepository for SurrealTenantRecordRepository<C> {
    async fn insert(
        &self,
        table: &str,
        organization_id: Uuid,
        data: serde_json::Value,
    ) -> WardenResult<TenantRecord> {
        ensure_identifier(table)?;
        let id = Uuid::new_v4();

        let result = self
            .db
            .query(
                "CREATE type::record($table, $id) SET \
                 organization_id = $org_id, data = $data",
            )
            .bind(("table", table.to_string()))
            .bind(("id", id.to_string()))
            .bind(("org_id", organization_id.to_string()))
            .bind(("data", data))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_response(table, e))?;
        let rows: Vec<RecordRow> = result.take(0).map_err(|e| DbError::from_response(table, e))?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(table, id))?;
        Ok(row.into_record(table, id)?)
    }

    async fn select(
        &self,
        table: &str,
        organization_id: Uuid,
        filters: &[Filter],
        limit: Option<u64>,
    ) -> WardenResult<Vec<TenantRecord>> {
        ensure_identifier(table)?;
        let mut query = format!(
            "SELECT meta::id(id) AS record_id, organization_id, data, created_at, updated_at \
             FROM type::table($table) WHERE {} ORDER BY created_at ASC",
            filter_clause(filters)?
        );
        if limit.is_some() {
            query.push_str(" LIMIT $limit");
        }

        let mut builder = self
            .db
            .query(&query)
            .bind(("table", table.to_string()))
            .bind(("org_id", organization_id.to_string()));
        for (i, filter) in filters.iter().enumerate() {
            builder = builder.bind((format!("f{i}"), filter.value.clone()));
        }
        if let Some(limit) = limit {
            builder = builder.bind(("limit", limit));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| DbError::from_response(table, e))?;
        let rows: Vec<RecordRowWithId> = result.take(0).map_err(|e| DbError::from_response(table, e))?;

        let records = rows
            .into_iter()
            .map(|row| row.into_record(table))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn update(
        &self,
        table: &str,
        organization_id: Uuid,
        id: Uuid,
        patch: serde_json::Value,
    ) -> WardenResult<TenantRecord> {
        ensure_identifier(table)?;
        if !patch.is_object() {
            return Err(WardenError::validation("record patch must be an object"));
        }

        let result = self
            .db
            .query(
                "UPDATE type::record($table, $id) \
                 MERGE { data: $patch, updated_at: time::now() } \
                 WHERE organization_id = $org_id",
            )
            .bind(("table", table.to_string()))
            .bind(("id", id.to_string()))
            .bind(("org_id", organization_id.to_string()))
            .bind(("patch", patch))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_response(table, e))?;
        let rows: Vec<RecordRow> = result.take(0).map_err(|e| DbError::from_response(table, e))?;
        // An empty result means the record is missing or belongs to
        // another organization; both read as not found.
        let row = rows.into_iter().next().ok_or_else(|| not_found(table, id))?;
        Ok(row.into_record(table, id)?)
    }

    async fn delete(&self, table: &str, organization_id: Uuid, id: Uuid) -> WardenResult<()> {
        ensure_identifier(table)?;

        let result = self
            .db
            .query(
                "DELETE type::record($table, $id) \
                 WHERE organization_id = $org_id RETURN BEFORE",
            )
            .bind(("table", table.to_string()))
            .bind(("id", id.to_string()))
            .bind(("org_id", organization_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_response(table, e))?;
        let rows: Vec<RecordRow> = result.take(0).map_err(|e| DbError::from_response(table, e))?;
        if rows.is_empty() {
            return Err(not_found(table, id).into());
        }
        Ok(())
    }
}
