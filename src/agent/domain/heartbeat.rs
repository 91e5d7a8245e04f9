//! Heartbeat messages published by agents.

use super::AgentId;
use crate::envelope::AgentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness signal published on the heartbeat channel.
///
/// The orchestrator stamps heartbeats with its own receipt time; `sent_at`
/// is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentHeartbeat {
    /// Registration the heartbeat belongs to.
    pub agent_id: AgentId,
    /// Agent type the sender believes it serves.
    pub agent_type: AgentType,
    /// Tasks currently being worked on.
    #[serde(default)]
    pub in_flight: u32,
    /// Sender-side timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl AgentHeartbeat {
    /// Creates a heartbeat with nothing in flight.
    #[must_use]
    pub const fn new(agent_id: AgentId, agent_type: AgentType) -> Self {
        Self {
            agent_id,
            agent_type,
            in_flight: 0,
            sent_at: None,
        }
    }

    /// Sets the number of tasks in flight.
    #[must_use]
    pub const fn with_in_flight(mut self, in_flight: u32) -> Self {
        self.in_flight = in_flight;
        self
    }
}
