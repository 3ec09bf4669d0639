//! Organization directory: lookups by id, code or domain that only
//! ever return active organizations.

use tracing::debug;
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::organization::{Organization, normalize_code, normalize_domain};
use warden_core::repository::OrganizationRepository;

#[derive(Clone)]
pub struct OrganizationDirectory<O: OrganizationRepository> {
    organizations: O,
}

impl<O: OrganizationRepository> OrganizationDirectory<O> {
    pub fn new(organizations: O) -> Self {
        Self { organizations }
    }

    /// The underlying repository, for callers that also write.
    pub fn repository(&self) -> &O {
        &self.organizations
    }

    pub async fn by_id(&self, id: Uuid) -> WardenResult<Organization> {
        let found = self.organizations.get_by_id(id).await;
        active_only(found, || id.to_string())
    }

    pub async fn by_code(&self, code: &str) -> WardenResult<Organization> {
        let code = normalize_code(code);
        let found = self.organizations.get_by_code(&code).await;
        active_only(found, || format!("code={code}"))
    }

    pub async fn by_domain(&self, domain: &str) -> WardenResult<Organization> {
        let domain = normalize_domain(domain);
        let found = self.organizations.get_by_domain(&domain).await;
        active_only(found, || format!("domain={domain}"))
    }
}

/// Inactive organizations read as not found; store errors pass through.
fn active_only(
    found: WardenResult<Organization>,
    reference: impl Fn() -> String,
) -> WardenResult<Organization> {
    match found {
        Ok(org) if org.is_active => Ok(org),
        Ok(org) => {
            debug!(organization_id = %org.id, "Organization is deactivated");
            Err(WardenError::NotFound {
                entity: "organization".into(),
                id: reference(),
            })
        }
        Err(err) if err.is_not_found() => {
            debug!(reference = %reference(), "Organization not found");
            Err(err)
        }
        Err(err) => Err(err),
    }
}
