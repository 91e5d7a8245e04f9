//! Event bus adapters.

pub mod memory;
pub mod retrying;
