//! Warden Engine: tenant context resolution, the context cache, quota
//! tracking, the tenant-scoped query gateway and tenant administration.

pub mod admin;
pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod invitation;
pub mod quota;
pub mod resolver;

pub use admin::{NewOrganization, TenantAdmin};
pub use cache::{CacheKey, CacheTicket, ContextCache, OrgSelector};
pub use config::EngineConfig;
pub use directory::OrganizationDirectory;
pub use error::EngineError;
pub use gateway::{QueryGateway, QuerySpec};
pub use quota::QuotaTracker;
pub use resolver::TenantResolver;
