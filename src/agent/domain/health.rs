//! Point-in-time health snapshot of registered agents.

use super::{AgentId, AgentRegistration, AgentStatus};
use crate::envelope::{AgentType, PlatformId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Health of one registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentHealth {
    /// Agent identifier.
    pub agent_id: AgentId,
    /// Agent type served.
    pub agent_type: AgentType,
    /// Platform scope, `None` for global agents.
    pub platform_id: Option<PlatformId>,
    /// Liveness status at report time.
    pub status: AgentStatus,
    /// Tasks in flight at the last heartbeat.
    pub in_flight: u32,
    /// Declared concurrency limit.
    pub concurrency_limit: u32,
    /// Last heartbeat receipt time.
    pub last_heartbeat_at: DateTime<Utc>,
    /// Milliseconds since the last heartbeat.
    pub silent_for_ms: u64,
}

impl AgentHealth {
    pub(crate) fn of(registration: &AgentRegistration, now: DateTime<Utc>) -> Self {
        Self {
            agent_id: registration.id(),
            agent_type: registration.agent_type(),
            platform_id: registration.platform_id().cloned(),
            status: registration.status(),
            in_flight: registration.in_flight(),
            concurrency_limit: registration.concurrency_limit(),
            last_heartbeat_at: registration.last_heartbeat_at(),
            silent_for_ms: millis(registration.silence_at(now)),
        }
    }
}

/// Health of every registered agent at `generated_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Report timestamp.
    pub generated_at: DateTime<Utc>,
    /// Silence window after which an agent counts as stale.
    pub stale_after_ms: u64,
    /// Per-agent health.
    pub agents: Vec<AgentHealth>,
}

impl HealthReport {
    pub(crate) fn new(
        generated_at: DateTime<Utc>,
        stale_after: Duration,
        agents: Vec<AgentHealth>,
    ) -> Self {
        Self {
            generated_at,
            stale_after_ms: millis(stale_after),
            agents,
        }
    }

    /// Returns the agents currently marked stale.
    pub fn stale(&self) -> impl Iterator<Item = &AgentHealth> {
        self.agents
            .iter()
            .filter(|agent| agent.status == AgentStatus::Stale)
    }

    /// Returns the number of active agents.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.agents
            .iter()
            .filter(|agent| agent.status == AgentStatus::Active)
            .count()
    }

    /// Returns `true` when every agent type has an active agent.
    #[must_use]
    pub fn covers_all_types(&self) -> bool {
        AgentType::ALL.iter().all(|kind| {
            self.agents
                .iter()
                .any(|agent| agent.agent_type == *kind && agent.status == AgentStatus::Active)
        })
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
