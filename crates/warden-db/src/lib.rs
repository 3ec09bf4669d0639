//! Warden Database: SurrealDB connection management, schema migrations
//! and repository implementations for the `warden-core` traits.

mod connection;
mod error;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use schema::{TENANT_TABLES, run_migrations};
