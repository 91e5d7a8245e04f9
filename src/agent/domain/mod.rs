//! Domain model for agent registration and health.

mod error;
mod health;
mod heartbeat;
mod ids;
mod registration;
mod status;

pub use error::{AgentDomainError, ParseAgentStatusError};
pub use health::{AgentHealth, HealthReport};
pub use heartbeat::AgentHeartbeat;
pub use ids::AgentId;
pub use registration::{AgentRegistration, PersistedAgentData};
pub use status::AgentStatus;
