//! Tenant-scoped query gateway.
//!
//! The only path to tenant-owned tables. Every statement is pinned to
//! the organization of the caller's [`TenantContext`]; callers cannot
//! widen or replace that predicate.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::context::TenantContext;
use warden_core::models::record::{Filter, TenantRecord, is_identifier};
use warden_core::repository::TenantRecordRepository;

use crate::config::EngineConfig;
use crate::error::EngineError;

/// A read against one tenant-owned table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuerySpec {
    pub table: String,
    /// Keys of `data` to keep. Empty keeps the whole payload.
    #[serde(default)]
    pub selection: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    pub limit: Option<u64>,
}

impl QuerySpec {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

pub struct QueryGateway<R: TenantRecordRepository> {
    records: R,
    tables: BTreeSet<String>,
}

impl<R: TenantRecordRepository> QueryGateway<R> {
    pub fn new(records: R, config: &EngineConfig) -> Self {
        Self {
            records,
            tables: config.tenant_tables.iter().cloned().collect(),
        }
    }

    pub async fn execute(
        &self,
        context: &TenantContext,
        query: QuerySpec,
    ) -> WardenResult<Vec<TenantRecord>> {
        self.check_table(context, &query.table)?;
        for name in query
            .selection
            .iter()
            .chain(query.filters.iter().map(|f| &f.field))
        {
            if !is_identifier(name) {
                return Err(EngineError::InvalidIdentifier(name.clone()).into());
            }
        }

        let organization_id = context.organization_id();
        let mut records = self
            .records
            .select(&query.table, organization_id, &query.filters, query.limit)
            .await?;
        debug!(
            organization_id = %organization_id,
            table = %query.table,
            rows = records.len(),
            "Tenant query executed"
        );

        if !query.selection.is_empty() {
            for record in &mut records {
                project(&mut record.data, &query.selection);
            }
        }
        Ok(records)
    }

    /// Insert a row stamped with the context's organization.
    pub async fn insert(
        &self,
        context: &TenantContext,
        table: &str,
        data: serde_json::Value,
    ) -> WardenResult<TenantRecord> {
        self.check_table(context, table)?;
        self.records
            .insert(table, context.organization_id(), data)
            .await
    }

    /// Merge `patch` into a row of the context's organization. Rows of
    /// other organizations read as not found.
    pub async fn update(
        &self,
        context: &TenantContext,
        table: &str,
        id: Uuid,
        patch: serde_json::Value,
    ) -> WardenResult<TenantRecord> {
        self.check_table(context, table)?;
        self.records
            .update(table, context.organization_id(), id, patch)
            .await
    }

    pub async fn delete(&self, context: &TenantContext, table: &str, id: Uuid) -> WardenResult<()> {
        self.check_table(context, table)?;
        self.records
            .delete(table, context.organization_id(), id)
            .await
    }

    fn check_table(&self, context: &TenantContext, table: &str) -> Result<(), EngineError> {
        if self.tables.contains(table) {
            return Ok(());
        }
        error!(
            organization_id = %context.organization_id(),
            user_id = %context.user_id(),
            table,
            "Query against a table that is not tenant-scoped"
        );
        Err(EngineError::UnknownTable(table.to_string()))
    }
}

/// Keep only the selected keys of an object payload.
fn project(data: &mut serde_json::Value, selection: &[String]) {
    if let serde_json::Value::Object(map) = data {
        map.retain(|key, _| selection.iter().any(|s| s == key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn projection_keeps_selected_keys() {
        let mut data = json!({"status": "open", "amount": 10, "notes": "x"});
        project(&mut data, &["status".to_string(), "amount".to_string()]);
        assert_eq!(data, json!({"status": "open", "amount": 10}));
    }

    #[test]
    fn query_builder() {
        let query = QuerySpec::table("claim")
            .select(["status"])
            .filter(Filter::eq("status", "open"))
            .limit(5);
        assert_eq!(query.table, "claim");
        assert_eq!(query.selection, vec!["status".to_string()]);
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.limit, Some(5));
    }
}
