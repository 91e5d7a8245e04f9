//! Domain model for versioned agent contracts.
//!
//! Contracts pair request and response [`Schema`]s with a version policy.
//! Everything here is pure: no I/O and no shared state.

mod contract;
mod error;
mod schema;
mod version;

pub use contract::{
    Contract, ContractBuilder, FieldMigration, FieldStep, PayloadMigration,
    SUPPORTED_PRIOR_VERSIONS, migration_key,
};
pub use error::{ContractError, SchemaRegistryError};
pub use schema::{FieldError, Property, Schema};
pub use version::SemVer;
