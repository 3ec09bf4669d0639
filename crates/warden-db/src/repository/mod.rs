//! SurrealDB repository implementations.

mod membership;
mod organization;
mod record;

pub use membership::SurrealMembershipRepository;
pub use organization::SurrealOrganizationRepository;
pub use record::SurrealTenantRecordRepository;
