//! Warden Core: domain models, the error taxonomy, the permission
//! deriver and the repository traits shared by every other crate.

pub mod error;
pub mod models;
pub mod repository;

pub use error::{WardenError, WardenResult};
pub use models::context::{TenantContext, has_permission};
pub use models::permission::{Capability, PermissionSet, derive};
