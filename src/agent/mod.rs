//! Agent registration, heartbeat tracking and health reporting.
//!
//! Agents announce themselves per agent type, optionally scoped to one
//! platform, and then emit periodic heartbeats. Health is advisory: the
//! dispatcher never consults it, so a silent agent only shows up as stale
//! in the health report. The module follows the same hexagonal layout as
//! the workflow module:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Registry and bus listeners in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
