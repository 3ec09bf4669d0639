//! Domain models for Warden.
//!
//! These are the core types shared across all crates.

pub mod context;
pub mod membership;
pub mod organization;
pub mod permission;
pub mod quota;
pub mod record;
