//! SurrealDB implementation of [`MembershipRepository`].
//!
//! The record id is `{user_id}_{organization_id}`, so a second CREATE
//! for the same pair fails instead of producing a duplicate row.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::membership::{
    CreateMembership, Invitation, Membership, UpdateMembership,
};
use warden_core::repository::{MembershipRepository, PaginatedResult, Pagination};

use crate::error::DbError;

const ENTITY: &str = "organization_membership";

#[derive(Debug, SurrealValue)]
struct MembershipRow {
    user_id: String,
    organization_id: String,
    role: String,
    status: String,
    custom_permissions: Vec<String>,
    invitation_token_hash: Option<String>,
    invitation_expires_at: Option<DateTime<Utc>>,
    invited_by: Option<String>,
    joined_at: DateTime<Utc>,
    deactivated_by: Option<String>,
    deactivated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::decode(ENTITY, format!("{field}: {e}")))
}

fn parse_optional_uuid(field: &str, value: Option<String>) -> Result<Option<Uuid>, DbError> {
    value.map(|v| parse_uuid(field, &v)).transpose()
}

impl MembershipRow {
    fn try_into_membership(self) -> Result<Membership, DbError> {
        let invitation = match (self.invitation_token_hash, self.invitation_expires_at) {
            (Some(token_hash), Some(expires_at)) => Some(Invitation {
                token_hash,
                expires_at,
            }),
            (None, None) => None,
            _ => {
                return Err(DbError::decode(
                    ENTITY,
                    "invitation token and expiry must be set together",
                ));
            }
        };

        Ok(Membership {
            user_id: parse_uuid("user_id", &self.user_id)?,
            organization_id: parse_uuid("organization_id", &self.organization_id)?,
            role: self
                .role
                .parse()
                .map_err(|e| DbError::decode(ENTITY, format!("{e}")))?,
            status: self
                .status
                .parse()
                .map_err(|e| DbError::decode(ENTITY, format!("{e}")))?,
            custom_permissions: self.custom_permissions,
            invitation,
            invited_by: parse_optional_uuid("invited_by", self.invited_by)?,
            joined_at: self.joined_at,
            deactivated_by: parse_optional_uuid("deactivated_by", self.deactivated_by)?,
            deactivated_at: self.deactivated_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn record_key(user_id: Uuid, organization_id: Uuid) -> String {
    format!("{user_id}_{organization_id}")
}

fn first_row(
    rows: Vec<MembershipRow>,
    user_id: Uuid,
    organization_id: Uuid,
) -> Result<Membership, DbError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: record_key(user_id, organization_id),
        })?
        .try_into_membership()
}

fn collect(rows: Vec<MembershipRow>) -> Result<Vec<Membership>, DbError> {
    rows.into_iter()
        .map(MembershipRow::try_into_membership)
        .collect()
}

/// SurrealDB implementation of the Membership repository.
#[derive(Clone)]
pub struct SurrealMembershipRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealMembershipRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> MembershipRepository for SurrealMembershipRepository<C> {
    async fn create(&self, input: CreateMembership) -> WardenResult<Membership> {
        let (token_hash, expires_at) = match input.invitation {
            Some(inv) => (Some(inv.token_hash), Some(inv.expires_at)),
            None => (None, None),
        };

        let result = self
            .db
            .query(
                "CREATE type::record('organization_membership', $id) SET \
                 user_id = $user_id, organization_id = $organization_id, \
                 role = $role, status = $status, \
                 custom_permissions = $custom_permissions, \
                 invitation_token_hash = $token_hash, \
                 invitation_expires_at = $expires_at, \
                 invited_by = $invited_by",
            )
            .bind(("id", record_key(input.user_id, input.organization_id)))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("organization_id", input.organization_id.to_string()))
            .bind(("role", input.role.as_str().to_string()))
            .bind(("status", input.status.as_str().to_string()))
            .bind(("custom_permissions", input.custom_permissions))
            .bind(("token_hash", token_hash))
            .bind(("expires_at", expires_at))
            .bind(("invited_by", input.invited_by.map(|id| id.to_string())))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_response(ENTITY, e))?;
        let rows: Vec<MembershipRow> = result.take(0).map_err(|e| DbError::from_response(ENTITY, e))?;
        Ok(first_row(rows, input.user_id, input.organization_id)?)
    }

    async fn get(&self, user_id: Uuid, organization_id: Uuid) -> WardenResult<Membership> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('organization_membership', $id)")
            .bind(("id", record_key(user_id, organization_id)))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MembershipRow> = result.take(0).map_err(|e| DbError::from_response(ENTITY, e))?;
        Ok(first_row(rows, user_id, organization_id)?)
    }

    async fn list_active_for_user(&self, user_id: Uuid) -> WardenResult<Vec<Membership>> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM organization_membership \
                 WHERE user_id = $user_id AND status = 'Active' \
                 ORDER BY joined_at ASC",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MembershipRow> = result.take(0).map_err(|e| DbError::from_response(ENTITY, e))?;
        Ok(collect(rows)?)
    }

    async fn list_by_organization(
        &self,
        organization_id: Uuid,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<Membership>> {
        let org_id_str = organization_id.to_string();

        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM organization_membership \
                 WHERE organization_id = $org_id GROUP ALL",
            )
            .bind(("org_id", org_id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(|e| DbError::from_response(ENTITY, e))?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT * FROM organization_membership \
                 WHERE organization_id = $org_id \
                 ORDER BY joined_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("org_id", org_id_str))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MembershipRow> = result.take(0).map_err(|e| DbError::from_response(ENTITY, e))?;
        Ok(PaginatedResult {
            items: collect(rows)?,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn count_active(&self, organization_id: Uuid) -> WardenResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM organization_membership \
                 WHERE organization_id = $org_id AND status = 'Active' GROUP ALL",
            )
            .bind(("org_id", organization_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(|e| DbError::from_response(ENTITY, e))?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    async fn update(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        input: UpdateMembership,
    ) -> WardenResult<Membership> {
        let mut sets = Vec::new();
        if input.role.is_some() {
            sets.push("role = $role");
        }
        if input.status.is_some() {
            sets.push("status = $status");
        }
        if input.custom_permissions.is_some() {
            sets.push("custom_permissions = $custom_permissions");
        }
        if input.invitation.is_some() {
            sets.push("invitation_token_hash = $token_hash, invitation_expires_at = $expires_at");
        }
        if input.invited_by.is_some() {
            sets.push("invited_by = $invited_by");
        }
        if input.joined_at.is_some() {
            sets.push("joined_at = $joined_at");
        }
        if input.deactivated_by.is_some() {
            sets.push("deactivated_by = $deactivated_by");
        }
        if input.deactivated_at.is_some() {
            sets.push("deactivated_at = $deactivated_at");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('organization_membership', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("id", record_key(user_id, organization_id)));

        if let Some(role) = input.role {
            builder = builder.bind(("role", role.as_str().to_string()));
        }
        if let Some(status) = input.status {
            builder = builder.bind(("status", status.as_str().to_string()));
        }
        if let Some(permissions) = input.custom_permissions {
            builder = builder.bind(("custom_permissions", permissions));
        }
        if let Some(invitation) = input.invitation {
            let (token_hash, expires_at) = match invitation {
                Some(inv) => (Some(inv.token_hash), Some(inv.expires_at)),
                None => (None, None),
            };
            builder = builder
                .bind(("token_hash", token_hash))
                .bind(("expires_at", expires_at));
        }
        if let Some(invited_by) = input.invited_by {
            builder = builder.bind(("invited_by", invited_by.map(|id| id.to_string())));
        }
        if let Some(joined_at) = input.joined_at {
            builder = builder.bind(("joined_at", joined_at));
        }
        if let Some(deactivated_by) = input.deactivated_by {
            builder = builder.bind(("deactivated_by", deactivated_by.map(|id| id.to_string())));
        }
        if let Some(deactivated_at) = input.deactivated_at {
            builder = builder.bind(("deactivated_at", deactivated_at));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| DbError::from_response(ENTITY, e))?;

        let rows: Vec<MembershipRow> = result.take(0).map_err(|e| DbError::from_response(ENTITY, e))?;
        Ok(first_row(rows, user_id, organization_id)?)
    }
}
