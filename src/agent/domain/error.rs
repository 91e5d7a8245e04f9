//! Error types for agent domain validation and parsing.

use super::AgentId;
use crate::envelope::AgentType;
use thiserror::Error;

/// Errors returned while constructing or updating agent registrations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentDomainError {
    /// The declared contract version is not `major.minor.patch`.
    #[error("contract version '{0}' is not a semantic version")]
    InvalidContractVersion(String),

    /// The agent declared it can run no tasks at all.
    #[error("concurrency limit must be at least 1")]
    ZeroConcurrency,

    /// A heartbeat named a different agent type than the registration.
    #[error("heartbeat for agent {agent_id} claims type '{claimed}', registered as '{registered}'")]
    HeartbeatMismatch {
        /// Agent that sent the heartbeat.
        agent_id: AgentId,
        /// Agent type in the registration.
        registered: AgentType,
        /// Agent type in the heartbeat.
        claimed: AgentType,
    },
}

/// Error returned while parsing agent status from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown agent status: {0}")]
pub struct ParseAgentStatusError(pub String);
