//! Versioned contracts enforced at every agent boundary.
//!
//! A [`domain::Contract`] pairs request and response schemas with a version
//! policy: the current version plus up to two prior versions are accepted,
//! and older messages are migrated before they are validated. Contracts
//! are collected at start-up into an immutable
//! [`registry::ContractRegistry`] that is shared by reference.
//!
//! - Domain types in [`domain`]
//! - Boundary checks in [`validation`]
//! - Registries in [`registry`]
//! - Shipped definitions in [`builtin`]

pub mod builtin;
pub mod domain;
pub mod registry;
pub mod validation;

pub use domain::{Contract, ContractError, FieldError, Schema, SchemaRegistryError, SemVer};
pub use registry::{ContractRegistry, ContractRegistryBuilder, SchemaRegistry};
pub use validation::{
    ValidationReport, validate_contract_definition, validate_input, validate_output,
};

#[cfg(test)]
mod tests;
