//! Organization domain model.
//!
//! Organizations are the tenant boundary. Every tenant-owned row carries
//! an organization id, and each organization carries its own resource
//! limits, usage counters, feature flags and security settings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WardenError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SubscriptionTier {
    Free,
    Starter,
    Professional,
    Enterprise,
}

impl SubscriptionTier {
    /// Limits applied when an organization is initialized on this tier.
    pub fn default_limits(self) -> ResourceLimits {
        match self {
            SubscriptionTier::Free => ResourceLimits {
                users: 3,
                properties: 5,
                claims: 10,
                ai_requests: 100,
                storage_mb: 1_024,
            },
            SubscriptionTier::Starter => ResourceLimits {
                users: 10,
                properties: 50,
                claims: 100,
                ai_requests: 1_000,
                storage_mb: 10_240,
            },
            SubscriptionTier::Professional => ResourceLimits {
                users: 50,
                properties: 500,
                claims: 1_000,
                ai_requests: 10_000,
                storage_mb: 102_400,
            },
            SubscriptionTier::Enterprise => ResourceLimits {
                users: 1_000,
                properties: 10_000,
                claims: 50_000,
                ai_requests: 250_000,
                storage_mb: 1_048_576,
            },
        }
    }

    /// Feature flags enabled by the tier. Organization-level flags
    /// override these.
    pub fn default_feature_flags(self) -> BTreeMap<String, bool> {
        let paid = self != SubscriptionTier::Free;
        let top = matches!(
            self,
            SubscriptionTier::Professional | SubscriptionTier::Enterprise
        );
        BTreeMap::from([
            ("ai_assistant".to_string(), paid),
            ("bulk_import".to_string(), top),
            ("custom_branding".to_string(), self == SubscriptionTier::Enterprise),
            ("document_ocr".to_string(), paid),
            ("sso".to_string(), self == SubscriptionTier::Enterprise),
        ])
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionTier::Free => "Free",
            SubscriptionTier::Starter => "Starter",
            SubscriptionTier::Professional => "Professional",
            SubscriptionTier::Enterprise => "Enterprise",
        }
    }
}

impl FromStr for SubscriptionTier {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Free" | "free" => Ok(SubscriptionTier::Free),
            "Starter" | "starter" => Ok(SubscriptionTier::Starter),
            "Professional" | "professional" => Ok(SubscriptionTier::Professional),
            "Enterprise" | "enterprise" => Ok(SubscriptionTier::Enterprise),
            other => Err(WardenError::validation(format!(
                "unknown subscription tier: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "Trialing",
            SubscriptionStatus::Active => "Active",
            SubscriptionStatus::PastDue => "PastDue",
            SubscriptionStatus::Canceled => "Canceled",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Trialing" => Ok(SubscriptionStatus::Trialing),
            "Active" => Ok(SubscriptionStatus::Active),
            "PastDue" => Ok(SubscriptionStatus::PastDue),
            "Canceled" => Ok(SubscriptionStatus::Canceled),
            other => Err(WardenError::validation(format!(
                "unknown subscription status: {other}"
            ))),
        }
    }
}

/// A metered resource with a per-organization ceiling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    Users,
    Properties,
    Claims,
    AiRequests,
    StorageMb,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Users,
        Resource::Properties,
        Resource::Claims,
        Resource::AiRequests,
        Resource::StorageMb,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Users => "users",
            Resource::Properties => "properties",
            Resource::Claims => "claims",
            Resource::AiRequests => "ai_requests",
            Resource::StorageMb => "storage_mb",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| WardenError::validation(format!("unknown resource: {s}")))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResourceLimits {
    pub users: u64,
    pub properties: u64,
    pub claims: u64,
    pub ai_requests: u64,
    pub storage_mb: u64,
}

impl ResourceLimits {
    pub fn get(&self, resource: Resource) -> u64 {
        match resource {
            Resource::Users => self.users,
            Resource::Properties => self.properties,
            Resource::Claims => self.claims,
            Resource::AiRequests => self.ai_requests,
            Resource::StorageMb => self.storage_mb,
        }
    }
}

/// Current usage counters; same shape as [`ResourceLimits`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResourceUsage {
    pub users: u64,
    pub properties: u64,
    pub claims: u64,
    pub ai_requests: u64,
    pub storage_mb: u64,
}

impl ResourceUsage {
    pub fn get(&self, resource: Resource) -> u64 {
        match resource {
            Resource::Users => self.users,
            Resource::Properties => self.properties,
            Resource::Claims => self.claims,
            Resource::AiRequests => self.ai_requests,
            Resource::StorageMb => self.storage_mb,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SecuritySettings {
    pub sso_enabled: bool,
    pub sso_provider: Option<String>,
    /// Provider-specific SSO configuration.
    pub sso_config: serde_json::Value,
    /// Members must enroll a second factor.
    pub require_2fa: bool,
    /// CIDR ranges allowed to reach the organization; empty = any.
    pub allowed_ip_ranges: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComplianceSettings {
    pub data_region: String,
    pub retention_days: u32,
}

impl Default for ComplianceSettings {
    fn default() -> Self {
        Self {
            data_region: "us-east-1".into(),
            retention_days: 2_555,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub id: Uuid,
    /// Short unique code (e.g., `acme`), stored lowercase.
    pub code: String,
    pub name: String,
    /// Primary domain, stored lowercase.
    pub primary_domain: String,
    pub additional_domains: Vec<String>,
    pub tier: SubscriptionTier,
    pub subscription_status: SubscriptionStatus,
    pub limits: ResourceLimits,
    pub usage: ResourceUsage,
    /// Free-form configuration map.
    pub settings: serde_json::Value,
    pub feature_flags: BTreeMap<String, bool>,
    pub security: SecuritySettings,
    pub compliance: ComplianceSettings,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Whether `domain` is the primary domain or one of the additional
    /// domains. Exact match, ASCII case-insensitive.
    pub fn owns_domain(&self, domain: &str) -> bool {
        let domain = normalize_domain(domain);
        self.primary_domain == domain || self.additional_domains.iter().any(|d| *d == domain)
    }

    /// Tier defaults overlaid with the organization's own flags.
    pub fn effective_feature_flags(&self) -> BTreeMap<String, bool> {
        let mut flags = self.tier.default_feature_flags();
        flags.extend(
            self.feature_flags
                .iter()
                .map(|(name, enabled)| (name.clone(), *enabled)),
        );
        flags
    }
}

/// Lowercase and trim a domain for storage and lookup.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Lowercase and trim an organization code for storage and lookup.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_lowercase()
}

/// Fields required to create a new organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganization {
    pub code: String,
    pub name: String,
    pub primary_domain: String,
    pub additional_domains: Vec<String>,
    pub tier: SubscriptionTier,
    pub subscription_status: SubscriptionStatus,
    pub limits: ResourceLimits,
    pub settings: Option<serde_json::Value>,
    pub feature_flags: BTreeMap<String, bool>,
    pub security: SecuritySettings,
    pub compliance: ComplianceSettings,
}

/// Fields that can be updated on an existing organization.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateOrganization {
    pub name: Option<String>,
    pub additional_domains: Option<Vec<String>>,
    pub tier: Option<SubscriptionTier>,
    pub subscription_status: Option<SubscriptionStatus>,
    pub limits: Option<ResourceLimits>,
    pub settings: Option<serde_json::Value>,
    pub feature_flags: Option<BTreeMap<String, bool>>,
    pub security: Option<SecuritySettings>,
    pub compliance: Option<ComplianceSettings>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> Organization {
        Organization {
            id: Uuid::new_v4(),
            code: "acme".into(),
            name: "Acme".into(),
            primary_domain: "acme.com".into(),
            additional_domains: vec!["acme.io".into()],
            tier: SubscriptionTier::Starter,
            subscription_status: SubscriptionStatus::Active,
            limits: SubscriptionTier::Starter.default_limits(),
            usage: ResourceUsage::default(),
            settings: serde_json::json!({}),
            feature_flags: BTreeMap::from([("bulk_import".to_string(), true)]),
            security: SecuritySettings::default(),
            compliance: ComplianceSettings::default(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn domain_match_is_exact_and_case_insensitive() {
        let org = org();
        assert!(org.owns_domain("ACME.com"));
        assert!(org.owns_domain("acme.io"));
        assert!(!org.owns_domain("mail.acme.com"));
        assert!(!org.owns_domain("acme"));
    }

    #[test]
    fn organization_flags_override_tier_defaults() {
        let flags = org().effective_feature_flags();
        assert_eq!(flags.get("bulk_import"), Some(&true));
        assert_eq!(flags.get("ai_assistant"), Some(&true));
        assert_eq!(flags.get("sso"), Some(&false));
    }

    #[test]
    fn resource_names_round_trip() {
        for resource in Resource::ALL {
            assert_eq!(resource.as_str().parse::<Resource>().unwrap(), resource);
        }
        assert!("bandwidth".parse::<Resource>().is_err());
    }
}
