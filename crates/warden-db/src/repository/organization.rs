//! SurrealDB implementation of [`OrganizationRepository`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::organization::{
    ComplianceSettings, CreateOrganization, Organization, Resource, ResourceLimits,
    ResourceUsage, SecuritySettings, UpdateOrganization, normalize_code, normalize_domain,
};
use warden_core::repository::{OrganizationRepository, PaginatedResult, Pagination};

use crate::error::{DbError, store_int};

const ENTITY: &str = "organization";

/// Row returned by CREATE/UPDATE, where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct OrganizationRow {
    code: String,
    name: String,
    primary_domain: String,
    additional_domains: Vec<String>,
    tier: String,
    subscription_status: String,
    limit_users: u64,
    limit_properties: u64,
    limit_claims: u64,
    limit_ai_requests: u64,
    limit_storage_mb: u64,
    current_users: u64,
    current_properties: u64,
    current_claims: u64,
    current_ai_requests: u64,
    current_storage_mb: u64,
    settings: serde_json::Value,
    feature_flags: serde_json::Value,
    security: serde_json::Value,
    compliance: serde_json::Value,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row returned by SELECT, carrying the record id via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct OrganizationRowWithId {
    record_id: String,
    code: String,
    name: String,
    primary_domain: String,
    additional_domains: Vec<String>,
    tier: String,
    subscription_status: String,
    limit_users: u64,
    limit_properties: u64,
    limit_claims: u64,
    limit_ai_requests: u64,
    limit_storage_mb: u64,
    current_users: u64,
    current_properties: u64,
    current_claims: u64,
    current_ai_requests: u64,
    current_storage_mb: u64,
    settings: serde_json::Value,
    feature_flags: serde_json::Value,
    security: serde_json::Value,
    compliance: serde_json::Value,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrganizationRowWithId {
    fn try_into_organization(self) -> Result<Organization, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::decode(ENTITY, format!("invalid UUID: {e}")))?;
        OrganizationRow {
            code: self.code,
            name: self.name,
            primary_domain: self.primary_domain,
            additional_domains: self.additional_domains,
            tier: self.tier,
            subscription_status: self.subscription_status,
            limit_users: self.limit_users,
            limit_properties: self.limit_properties,
            limit_claims: self.limit_claims,
            limit_ai_requests: self.limit_ai_requests,
            limit_storage_mb: self.limit_storage_mb,
            current_users: self.current_users,
            current_properties: self.current_properties,
            current_claims: self.current_claims,
            current_ai_requests: self.current_ai_requests,
            current_storage_mb: self.current_storage_mb,
            settings: self.settings,
            feature_flags: self.feature_flags,
            security: self.security,
            compliance: self.compliance,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_organization(id)
    }
}

impl OrganizationRow {
    /// The single place where stored organization rows become domain
    /// values.
    fn into_organization(self, id: Uuid) -> Result<Organization, DbError> {
        let feature_flags: BTreeMap<String, bool> = serde_json::from_value(self.feature_flags)
            .map_err(|e| DbError::decode(ENTITY, format!("feature_flags: {e}")))?;
        let security: SecuritySettings = serde_json::from_value(self.security)
            .map_err(|e| DbError::decode(ENTITY, format!("security: {e}")))?;
        let compliance: ComplianceSettings = serde_json::from_value(self.compliance)
            .map_err(|e| DbError::decode(ENTITY, format!("compliance: {e}")))?;

        Ok(Organization {
            id,
            code: self.code,
            name: self.name,
            primary_domain: self.primary_domain,
            additional_domains: self.additional_domains,
            tier: self
                .tier
                .parse()
                .map_err(|e| DbError::decode(ENTITY, format!("{e}")))?,
            subscription_status: self
                .subscription_status
                .parse()
                .map_err(|e| DbError::decode(ENTITY, format!("{e}")))?,
            limits: ResourceLimits {
                users: self.limit_users,
                properties: self.limit_properties,
                claims: self.limit_claims,
                ai_requests: self.limit_ai_requests,
                storage_mb: self.limit_storage_mb,
            },
            usage: ResourceUsage {
                users: self.current_users,
                properties: self.current_properties,
                claims: self.current_claims,
                ai_requests: self.current_ai_requests,
                storage_mb: self.current_storage_mb,
            },
            settings: self.settings,
            feature_flags,
            security,
            compliance,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// Counter column for a resource. Static strings only, so it is safe
/// to splice into statements.
fn usage_column(resource: Resource) -> &'static str {
    match resource {
        Resource::Users => "current_users",
        Resource::Properties => "current_properties",
        Resource::Claims => "current_claims",
        Resource::AiRequests => "current_ai_requests",
        Resource::StorageMb => "current_storage_mb",
    }
}

fn to_json<T: serde::Serialize>(field: &str, value: &T) -> Result<serde_json::Value, DbError> {
    serde_json::to_value(value).map_err(|e| DbError::decode(ENTITY, format!("{field}: {e}")))
}

fn normalize_domains(domains: Vec<String>) -> Vec<String> {
    let mut domains: Vec<String> = domains.iter().map(|d| normalize_domain(d)).collect();
    domains.sort();
    domains.dedup();
    domains
}

fn first_row(rows: Vec<OrganizationRow>, id: Uuid) -> Result<Organization, DbError> {
    let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
        entity: ENTITY.into(),
        id: id.to_string(),
    })?;
    row.into_organization(id)
}

/// SurrealDB implementation of the Organization repository.
#[derive(Clone)]
pub struct SurrealOrganizationRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealOrganizationRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn select_one(
        &self,
        condition: &str,
        binding: (&'static str, String),
        missing: String,
    ) -> Result<Organization, DbError> {
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM organization WHERE {condition}"
        );
        let mut result = self.db.query(query).bind(binding).await?;

        let rows: Vec<OrganizationRowWithId> =
            result.take(0).map_err(|e| DbError::from_response(ENTITY, e))?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: missing,
        })?;
        row.try_into_organization()
    }
}

impl<C: Connection> OrganizationRepository for SurrealOrganizationRepository<C> {
    async fn create(&self, input: CreateOrganization) -> WardenResult<Organization> {
        let id = Uuid::new_v4();
        let settings = input
            .settings
            .unwrap_or(serde_json::Value::Object(Default::default()));

        let result = self
            .db
            .query(
                "CREATE type::record('organization', $id) SET \
                 code = $code, name = $name, \
                 primary_domain = $primary_domain, \
                 additional_domains = $additional_domains, \
                 tier = $tier, subscription_status = $subscription_status, \
                 limit_users = $limit_users, \
                 limit_properties = $limit_properties, \
                 limit_claims = $limit_claims, \
                 limit_ai_requests = $limit_ai_requests, \
                 limit_storage_mb = $limit_storage_mb, \
                 settings = $settings, feature_flags = $feature_flags, \
                 security = $security, compliance = $compliance, \
                 is_active = true",
            )
            .bind(("id", id.to_string()))
            .bind(("code", normalize_code(&input.code)))
            .bind(("name", input.name))
            .bind(("primary_domain", normalize_domain(&input.primary_domain)))
            .bind((
                "additional_domains",
                normalize_domains(input.additional_domains),
            ))
            .bind(("tier", input.tier.as_str().to_string()))
            .bind((
                "subscription_status",
                input.subscription_status.as_str().to_string(),
            ))
            .bind(("limit_users", store_int("limit_users", input.limits.users)?))
            .bind(("limit_properties", store_int("limit_properties", input.limits.properties)?))
            .bind(("limit_claims", store_int("limit_claims", input.limits.claims)?))
            .bind(("limit_ai_requests", store_int("limit_ai_requests", input.limits.ai_requests)?))
            .bind(("limit_storage_mb", store_int("limit_storage_mb", input.limits.storage_mb)?))
            .bind(("settings", settings))
            .bind(("feature_flags", to_json("feature_flags", &input.feature_flags)?))
            .bind(("security", to_json("security", &input.security)?))
            .bind(("compliance", to_json("compliance", &input.compliance)?))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_response(ENTITY, e))?;
        let rows: Vec<OrganizationRow> = result.take(0).map_err(|e| DbError::from_response(ENTITY, e))?;
        Ok(first_row(rows, id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<Organization> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('organization', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OrganizationRow> = result.take(0).map_err(|e| DbError::from_response(ENTITY, e))?;
        Ok(first_row(rows, id)?)
    }

    async fn get_by_code(&self, code: &str) -> WardenResult<Organization> {
        let code = normalize_code(code);
        Ok(self
            .select_one("code = $code", ("code", code.clone()), format!("code={code}"))
            .await?)
    }

    async fn get_by_domain(&self, domain: &str) -> WardenResult<Organization> {
        let domain = normalize_domain(domain);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM organization \
                 WHERE primary_domain = $domain \
                 OR additional_domains CONTAINS $domain",
            )
            .bind(("domain", domain.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OrganizationRowWithId> = result.take(0).map_err(|e| DbError::from_response(ENTITY, e))?;
        let mut organizations = rows
            .into_iter()
            .map(|row| row.try_into_organization())
            .collect::<Result<Vec<_>, DbError>>()?;

        // Active beats inactive, then a primary-domain match beats an
        // additional-domain match, then the oldest organization wins.
        organizations.sort_by_key(|org| {
            (
                !org.is_active,
                org.primary_domain != domain,
                org.created_at,
            )
        });
        organizations.into_iter().next().ok_or_else(|| {
            DbError::NotFound {
                entity: ENTITY.into(),
                id: format!("domain={domain}"),
            }
            .into()
        })
    }

    async fn update(&self, id: Uuid, input: UpdateOrganization) -> WardenResult<Organization> {
        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.additional_domains.is_some() {
            sets.push("additional_domains = $additional_domains");
        }
        if input.tier.is_some() {
            sets.push("tier = $tier");
        }
        if input.subscription_status.is_some() {
            sets.push("subscription_status = $subscription_status");
        }
        if input.limits.is_some() {
            sets.push(
                "limit_users = $limit_users, limit_properties = $limit_properties, \
                 limit_claims = $limit_claims, limit_ai_requests = $limit_ai_requests, \
                 limit_storage_mb = $limit_storage_mb",
            );
        }
        if input.settings.is_some() {
            sets.push("settings = $settings");
        }
        if input.feature_flags.is_some() {
            sets.push("feature_flags = $feature_flags");
        }
        if input.security.is_some() {
            sets.push("security = $security");
        }
        if input.compliance.is_some() {
            sets.push("compliance = $compliance");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('organization', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id.to_string()));

        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(domains) = input.additional_domains {
            builder = builder.bind(("additional_domains", normalize_domains(domains)));
        }
        if let Some(tier) = input.tier {
            builder = builder.bind(("tier", tier.as_str().to_string()));
        }
        if let Some(status) = input.subscription_status {
            builder = builder.bind(("subscription_status", status.as_str().to_string()));
        }
        if let Some(limits) = input.limits {
            builder = builder
                .bind(("limit_users", store_int("limit_users", limits.users)?))
                .bind(("limit_properties", store_int("limit_properties", limits.properties)?))
                .bind(("limit_claims", store_int("limit_claims", limits.claims)?))
                .bind(("limit_ai_requests", store_int("limit_ai_requests", limits.ai_requests)?))
                .bind(("limit_storage_mb", store_int("limit_storage_mb", limits.storage_mb)?));
        }
        if let Some(settings) = input.settings {
            builder = builder.bind(("settings", settings));
        }
        if let Some(flags) = input.feature_flags {
            builder = builder.bind(("feature_flags", to_json("feature_flags", &flags)?));
        }
        if let Some(security) = input.security {
            builder = builder.bind(("security", to_json("security", &security)?));
        }
        if let Some(compliance) = input.compliance {
            builder = builder.bind(("compliance", to_json("compliance", &compliance)?));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| DbError::from_response(ENTITY, e))?;

        let rows: Vec<OrganizationRow> = result.take(0).map_err(|e| DbError::from_response(ENTITY, e))?;
        Ok(first_row(rows, id)?)
    }

    async fn adjust_usage(
        &self,
        id: Uuid,
        resource: Resource,
        delta: i64,
    ) -> WardenResult<Organization> {
        let column = usage_column(resource);

        // One guarded statement: the increment and the non-negative check
        // are applied together by the store.
        let query = format!(
            "UPDATE type::record('organization', $id) \
             SET {column} += $delta, updated_at = time::now() \
             WHERE {column} + $delta >= 0"
        );

        let result = self
            .db
            .query(query)
            .bind(("id", id.to_string()))
            .bind(("delta", delta))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| DbError::from_response(ENTITY, e))?;

        let rows: Vec<OrganizationRow> = result.take(0).map_err(|e| DbError::from_response(ENTITY, e))?;
        match rows.into_iter().next() {
            Some(row) => Ok(row.into_organization(id)?),
            None => {
                // Either the organization is missing or the guard refused
                // the update; the follow-up read tells them apart.
                let current = self.get_by_id(id).await?;
                Err(WardenError::validation(format!(
                    "{resource} usage cannot drop below zero (current {}, delta {delta})",
                    current.usage.get(resource)
                )))
            }
        }
    }

    async fn set_usage(&self, id: Uuid, resource: Resource, value: u64) -> WardenResult<Organization> {
        let column = usage_column(resource);
        let query = format!(
            "UPDATE type::record('organization', $id) \
             SET {column} = $value, updated_at = time::now()"
        );

        let result = self
            .db
            .query(query)
            .bind(("id", id.to_string()))
            .bind(("value", store_int(column, value)?))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| DbError::from_response(ENTITY, e))?;

        let rows: Vec<OrganizationRow> = result.take(0).map_err(|e| DbError::from_response(ENTITY, e))?;
        Ok(first_row(rows, id)?)
    }

    async fn list(&self, pagination: Pagination) -> WardenResult<PaginatedResult<Organization>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM organization GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(|e| DbError::from_response(ENTITY, e))?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM organization \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OrganizationRowWithId> = result.take(0).map_err(|e| DbError::from_response(ENTITY, e))?;
        let items = rows
            .into_iter()
            .map(|row| row.try_into_organization())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
