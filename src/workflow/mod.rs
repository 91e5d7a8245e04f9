//! Workflow lifecycle: the aggregate and its state machine, persistence
//! ports with in-memory adapters, and the orchestration service that moves
//! workflows through their stages.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
