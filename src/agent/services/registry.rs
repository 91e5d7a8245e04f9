//! Service layer for agent registration and health.
//!
//! Provides [`AgentRegistryService`], which admits agents whose contract
//! version the orchestrator can talk to, resolves the agent serving a
//! platform and folds heartbeats into a health report.

use crate::agent::{
    domain::{
        AgentDomainError, AgentHealth, AgentHeartbeat, AgentId, AgentRegistration, HealthReport,
    },
    ports::{AgentRepository, AgentRepositoryError, scope_label},
};
use crate::contract::ContractRegistry;
use crate::envelope::{AgentType, ErrorCode, PlatformId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Silence after which an agent no longer holds its scope.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

/// Request payload for registering an agent.
///
/// Also the wire shape of messages on the registration channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterAgentRequest {
    agent_type: AgentType,
    #[serde(default)]
    platform_id: Option<PlatformId>,
    contract_version: String,
    #[serde(default = "default_concurrency_limit")]
    concurrency_limit: u32,
}

const fn default_concurrency_limit() -> u32 {
    1
}

impl RegisterAgentRequest {
    /// Creates a global registration request with a concurrency limit of 1.
    #[must_use]
    pub fn new(agent_type: AgentType, contract_version: impl Into<String>) -> Self {
        Self {
            agent_type,
            platform_id: None,
            contract_version: contract_version.into(),
            concurrency_limit: default_concurrency_limit(),
        }
    }

    /// Scopes the registration to one platform.
    #[must_use]
    pub fn with_platform(mut self, platform_id: PlatformId) -> Self {
        self.platform_id = Some(platform_id);
        self
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub const fn with_concurrency_limit(mut self, limit: u32) -> Self {
        self.concurrency_limit = limit;
        self
    }
}

/// Service-level errors for agent registry operations.
#[derive(Debug, Error)]
pub enum AgentRegistryError {
    /// Another agent already serves this agent type and scope.
    #[error(
        "agent type '{agent_type}' is already registered for {}",
        scope_label(.platform_id.as_ref())
    )]
    Conflict {
        /// Contested agent type.
        agent_type: AgentType,
        /// Contested platform, `None` for the global scope.
        platform_id: Option<PlatformId>,
    },
    /// No contract covers the agent type, or it rejects the version.
    #[error("contract version {version} is not accepted for agent type '{agent_type}'")]
    UnsupportedContractVersion {
        /// Agent type being registered.
        agent_type: AgentType,
        /// Declared contract version.
        version: String,
    },
    /// The agent is not registered.
    #[error("agent not found: {0}")]
    UnknownAgent(AgentId),
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] AgentDomainError),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(AgentRepositoryError),
}

impl AgentRegistryError {
    /// Returns the wire error code for rejections agents can act on.
    #[must_use]
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Conflict { .. } => Some(ErrorCode::Conflict),
            Self::UnsupportedContractVersion { .. } | Self::Domain(_) => {
                Some(ErrorCode::EnvelopeValidationError)
            }
            Self::UnknownAgent(_) | Self::Repository(_) => None,
        }
    }
}

impl From<AgentRepositoryError> for AgentRegistryError {
    fn from(err: AgentRepositoryError) -> Self {
        match err {
            AgentRepositoryError::ScopeTaken {
                agent_type,
                platform_id,
            } => Self::Conflict {
                agent_type,
                platform_id,
            },
            AgentRepositoryError::NotFound(id) => Self::UnknownAgent(id),
            other => Self::Repository(other),
        }
    }
}

/// Result type for agent registry service operations.
pub type AgentRegistryResult<T> = Result<T, AgentRegistryError>;

/// Agent registration, resolution and health service.
pub struct AgentRegistryService<R, C>
where
    R: AgentRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    contracts: Arc<ContractRegistry>,
    clock: Arc<C>,
    stale_after: Duration,
}

impl<R, C> Clone for AgentRegistryService<R, C>
where
    R: AgentRepository,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            contracts: Arc::clone(&self.contracts),
            clock: Arc::clone(&self.clock),
            stale_after: self.stale_after,
        }
    }
}

impl<R, C> AgentRegistryService<R, C>
where
    R: AgentRepository,
    C: Clock + Send + Sync,
{
    /// Creates a new agent registry service.
    #[must_use]
    pub const fn new(repository: Arc<R>, contracts: Arc<ContractRegistry>, clock: Arc<C>) -> Self {
        Self {
            repository,
            contracts,
            clock,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    /// Sets the silence after which a scope holder may be replaced.
    #[must_use]
    pub const fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Registers an agent.
    ///
    /// The declared contract version must be accepted by the contract
    /// that governs the agent's type and platform. A holder of the same
    /// scope that has been silent for longer than the stale window is
    /// removed and replaced.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRegistryError::Conflict`] when an active agent
    /// already holds the same scope,
    /// [`AgentRegistryError::UnsupportedContractVersion`] when the version
    /// is not accepted, or [`AgentRegistryError::Domain`] for malformed
    /// input.
    pub async fn register(
        &self,
        request: RegisterAgentRequest,
    ) -> AgentRegistryResult<AgentRegistration> {
        let RegisterAgentRequest {
            agent_type,
            platform_id,
            contract_version,
            concurrency_limit,
        } = request;

        let accepted = self
            .contracts
            .resolve(agent_type, platform_id.as_ref())
            .is_some_and(|contract| contract.supports(&contract_version));
        if !accepted {
            return Err(AgentRegistryError::UnsupportedContractVersion {
                agent_type,
                version: contract_version,
            });
        }

        let registration = AgentRegistration::new(
            agent_type,
            platform_id,
            &contract_version,
            concurrency_limit,
            &*self.clock,
        )?;
        self.evict_stale_holder(&registration).await?;
        if let Err(err) = self.repository.register(&registration).await {
            warn!(%agent_type, error = %err, "agent registration rejected");
            return Err(err.into());
        }
        info!(
            agent_id = %registration.id(),
            %agent_type,
            platform_id = registration.platform_id().map(PlatformId::as_str),
            contract_version = %registration.contract_version(),
            "agent registered"
        );
        Ok(registration)
    }

    /// Removes an agent and frees its scope.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRegistryError::UnknownAgent`] when the agent is not
    /// registered.
    pub async fn deregister(&self, id: AgentId) -> AgentRegistryResult<AgentRegistration> {
        let removed = self.repository.remove(id).await?;
        info!(
            agent_id = %removed.id(),
            agent_type = %removed.agent_type(),
            platform_id = removed.platform_id().map(PlatformId::as_str),
            "agent deregistered"
        );
        Ok(removed)
    }

    async fn evict_stale_holder(&self, incoming: &AgentRegistration) -> AgentRegistryResult<()> {
        let holder = self
            .repository
            .find_by_scope(incoming.agent_type(), incoming.platform_id().cloned())
            .await?;
        let Some(current) = holder else {
            return Ok(());
        };
        if current.silence_at(self.clock.utc()) <= self.stale_after {
            return Ok(());
        }
        match self.repository.remove(current.id()).await {
            Ok(_) | Err(AgentRepositoryError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        info!(
            stale_agent_id = %current.id(),
            agent_id = %incoming.id(),
            agent_type = %incoming.agent_type(),
            platform_id = incoming.platform_id().map(PlatformId::as_str),
            "stale agent replaced"
        );
        Ok(())
    }

    /// Resolves the agent serving `agent_type` for `platform_id`.
    ///
    /// A platform-scoped registration wins; otherwise the global one is
    /// returned. Stale agents are still returned.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRegistryError::Repository`] when the lookup fails.
    pub async fn resolve(
        &self,
        agent_type: AgentType,
        platform_id: Option<&PlatformId>,
    ) -> AgentRegistryResult<Option<AgentRegistration>> {
        if let Some(platform) = platform_id {
            let scoped = self
                .repository
                .find_by_scope(agent_type, Some(platform.clone()))
                .await?;
            if scoped.is_some() {
                return Ok(scoped);
            }
        }
        Ok(self.repository.find_by_scope(agent_type, None).await?)
    }

    /// Finds a registration by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRegistryError::Repository`] when the lookup fails.
    pub async fn find_by_id(&self, id: AgentId) -> AgentRegistryResult<Option<AgentRegistration>> {
        Ok(self.repository.find_by_id(id).await?)
    }

    /// Returns every registration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRegistryError::Repository`] when the lookup fails.
    pub async fn list_all(&self) -> AgentRegistryResult<Vec<AgentRegistration>> {
        Ok(self.repository.list_all().await?)
    }

    /// Records a heartbeat for a registered agent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRegistryError::UnknownAgent`] for unregistered
    /// agents or [`AgentRegistryError::Domain`] when the heartbeat claims
    /// another agent type.
    pub async fn record_heartbeat(
        &self,
        heartbeat: &AgentHeartbeat,
    ) -> AgentRegistryResult<AgentRegistration> {
        let mut registration = self
            .repository
            .find_by_id(heartbeat.agent_id)
            .await?
            .ok_or(AgentRegistryError::UnknownAgent(heartbeat.agent_id))?;
        let was = registration.status();
        registration.record_heartbeat(heartbeat, &*self.clock)?;
        self.repository.update(&registration).await?;
        if was == registration.status() {
            debug!(agent_id = %registration.id(), in_flight = heartbeat.in_flight, "heartbeat");
        } else {
            info!(
                agent_id = %registration.id(),
                agent_type = %registration.agent_type(),
                "agent is active again"
            );
        }
        Ok(registration)
    }

    /// Builds a health report at `now`, marking agents silent for longer
    /// than `stale_after` as stale.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRegistryError::Repository`] when the registry cannot
    /// be read or updated.
    pub async fn health_report(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> AgentRegistryResult<HealthReport> {
        let mut agents = Vec::new();
        for mut registration in self.repository.list_all().await? {
            if registration.refresh_status(now, stale_after) {
                warn!(
                    agent_id = %registration.id(),
                    agent_type = %registration.agent_type(),
                    status = %registration.status(),
                    "agent liveness changed"
                );
                self.repository.update(&registration).await?;
            }
            agents.push(AgentHealth::of(&registration, now));
        }
        Ok(HealthReport::new(now, stale_after, agents))
    }

    /// Builds a health report at the service clock's current time.
    ///
    /// # Errors
    ///
    /// See [`AgentRegistryService::health_report`].
    pub async fn health_now(&self, stale_after: Duration) -> AgentRegistryResult<HealthReport> {
        self.health_report(self.clock.utc(), stale_after).await
    }
}
