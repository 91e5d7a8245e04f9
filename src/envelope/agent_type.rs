//! Agent type tags used for queue routing.

use super::ParseAgentTypeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel on which agents publish results back to the orchestrator.
pub const RESULTS_CHANNEL: &str = "orchestrator:results";

/// Channel carrying agent liveness announcements.
pub const HEARTBEAT_CHANNEL: &str = "agent:heartbeat";

/// Channel carrying agent registration announcements.
pub const REGISTRATION_CHANNEL: &str = "agent:registration";

/// Channel on which workflow lifecycle events are published for observers.
pub const WORKFLOW_EVENTS_CHANNEL: &str = "workflow:events";

/// Kind of agent a task is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Project analysis and code scaffolding.
    Scaffold,
    /// Static analysis, lint, coverage and security checks.
    Validation,
    /// End-to-end test generation and execution.
    E2e,
    /// Branch merging and conflict resolution.
    Integration,
    /// Container build, registry push and cluster rollout.
    Deployment,
}

impl AgentType {
    /// Every agent type, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Scaffold,
        Self::Validation,
        Self::E2e,
        Self::Integration,
        Self::Deployment,
    ];

    /// Returns the canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scaffold => "scaffold",
            Self::Validation => "validation",
            Self::E2e => "e2e",
            Self::Integration => "integration",
            Self::Deployment => "deployment",
        }
    }

    /// Returns the work-queue channel this agent type consumes.
    #[must_use]
    pub fn task_channel(self) -> String {
        format!("agent:{}:tasks", self.as_str())
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AgentType {
    type Error = ParseAgentTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "scaffold" => Ok(Self::Scaffold),
            "validation" => Ok(Self::Validation),
            "e2e" => Ok(Self::E2e),
            "integration" => Ok(Self::Integration),
            "deployment" => Ok(Self::Deployment),
            _ => Err(ParseAgentTypeError(value.to_owned())),
        }
    }
}
