//! Agent registry service and bus listeners.

mod listener;
mod registry;

pub use listener::{HeartbeatListener, RegistrationListener};
pub use registry::{
    AgentRegistryError, AgentRegistryResult, AgentRegistryService, DEFAULT_STALE_AFTER,
    RegisterAgentRequest,
};
