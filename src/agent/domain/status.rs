//! Agent liveness status.

use super::ParseAgentStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Liveness of a registered agent as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Heartbeats arrive within the configured window.
    Active,
    /// No heartbeat arrived within the configured window.
    Stale,
}

impl AgentStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Stale => "stale",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AgentStatus {
    type Error = ParseAgentStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "active" => Ok(Self::Active),
            "stale" => Ok(Self::Stale),
            _ => Err(ParseAgentStatusError(value.to_owned())),
        }
    }
}
