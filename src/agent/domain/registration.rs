//! Agent registration aggregate root.

use super::{AgentDomainError, AgentHeartbeat, AgentId, AgentStatus};
use crate::contract::SemVer;
use crate::envelope::{AgentType, PlatformId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A running agent known to the orchestrator.
///
/// At most one registration exists per agent type and platform scope; a
/// registration without a platform is the global fallback for its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRegistration {
    id: AgentId,
    agent_type: AgentType,
    platform_id: Option<PlatformId>,
    contract_version: SemVer,
    concurrency_limit: u32,
    status: AgentStatus,
    in_flight: u32,
    registered_at: DateTime<Utc>,
    last_heartbeat_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedAgentData {
    /// Persisted agent identifier.
    pub id: AgentId,
    /// Persisted agent type.
    pub agent_type: AgentType,
    /// Persisted platform scope.
    pub platform_id: Option<PlatformId>,
    /// Persisted contract version.
    pub contract_version: SemVer,
    /// Persisted concurrency limit.
    pub concurrency_limit: u32,
    /// Persisted liveness status.
    pub status: AgentStatus,
    /// Tasks in flight at the last heartbeat.
    pub in_flight: u32,
    /// Persisted registration timestamp.
    pub registered_at: DateTime<Utc>,
    /// Persisted heartbeat timestamp.
    pub last_heartbeat_at: DateTime<Utc>,
}

impl AgentRegistration {
    /// Creates an `Active` registration. Registering counts as the first
    /// heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDomainError::InvalidContractVersion`] for a malformed
    /// version or [`AgentDomainError::ZeroConcurrency`] for a zero limit.
    pub fn new(
        agent_type: AgentType,
        platform_id: Option<PlatformId>,
        contract_version: &str,
        concurrency_limit: u32,
        clock: &impl Clock,
    ) -> Result<Self, AgentDomainError> {
        let version = SemVer::parse(contract_version)
            .map_err(|_| AgentDomainError::InvalidContractVersion(contract_version.to_owned()))?;
        if concurrency_limit == 0 {
            return Err(AgentDomainError::ZeroConcurrency);
        }
        let timestamp = clock.utc();
        Ok(Self {
            id: AgentId::new(),
            agent_type,
            platform_id,
            contract_version: version,
            concurrency_limit,
            status: AgentStatus::Active,
            in_flight: 0,
            registered_at: timestamp,
            last_heartbeat_at: timestamp,
        })
    }

    /// Reconstructs a registration from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedAgentData) -> Self {
        Self {
            id: data.id,
            agent_type: data.agent_type,
            platform_id: data.platform_id,
            contract_version: data.contract_version,
            concurrency_limit: data.concurrency_limit,
            status: data.status,
            in_flight: data.in_flight,
            registered_at: data.registered_at,
            last_heartbeat_at: data.last_heartbeat_at,
        }
    }

    /// Returns the agent identifier.
    #[must_use]
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// Returns the agent type served.
    #[must_use]
    pub const fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    /// Returns the platform scope, `None` for a global registration.
    #[must_use]
    pub const fn platform_id(&self) -> Option<&PlatformId> {
        self.platform_id.as_ref()
    }

    /// Returns the contract version the agent speaks.
    #[must_use]
    pub const fn contract_version(&self) -> SemVer {
        self.contract_version
    }

    /// Returns the maximum number of concurrent tasks.
    #[must_use]
    pub const fn concurrency_limit(&self) -> u32 {
        self.concurrency_limit
    }

    /// Returns the liveness status.
    #[must_use]
    pub const fn status(&self) -> AgentStatus {
        self.status
    }

    /// Returns the tasks in flight reported by the last heartbeat.
    #[must_use]
    pub const fn in_flight(&self) -> u32 {
        self.in_flight
    }

    /// Returns the registration timestamp.
    #[must_use]
    pub const fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Returns when the last heartbeat was received.
    #[must_use]
    pub const fn last_heartbeat_at(&self) -> DateTime<Utc> {
        self.last_heartbeat_at
    }

    /// Records a heartbeat received now and marks the agent `Active`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDomainError::HeartbeatMismatch`] when the heartbeat
    /// claims another agent type.
    pub fn record_heartbeat(
        &mut self,
        heartbeat: &AgentHeartbeat,
        clock: &impl Clock,
    ) -> Result<(), AgentDomainError> {
        if heartbeat.agent_type != self.agent_type {
            return Err(AgentDomainError::HeartbeatMismatch {
                agent_id: self.id,
                registered: self.agent_type,
                claimed: heartbeat.agent_type,
            });
        }
        self.in_flight = heartbeat.in_flight;
        self.last_heartbeat_at = clock.utc();
        self.status = AgentStatus::Active;
        Ok(())
    }

    /// Returns how long the agent has been silent at `now`.
    ///
    /// Heartbeats stamped after `now` count as zero silence.
    #[must_use]
    pub fn silence_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.last_heartbeat_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Marks the agent `Stale` when silent for longer than `stale_after`.
    ///
    /// Returns `true` when the status changed.
    pub fn refresh_status(&mut self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        let next = if self.silence_at(now) > stale_after {
            AgentStatus::Stale
        } else {
            AgentStatus::Active
        };
        let changed = next != self.status;
        self.status = next;
        changed
    }
}
