//! Adapter implementations for agent registration persistence.

pub mod memory;
