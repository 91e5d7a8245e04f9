//! Step definitions for agent registration scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
