//! Repository port for agent registrations.

use crate::agent::domain::{AgentId, AgentRegistration};
use crate::envelope::{AgentType, PlatformId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for agent repository operations.
pub type AgentRepositoryResult<T> = Result<T, AgentRepositoryError>;

/// Agent registration persistence contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Stores a new registration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRepositoryError::DuplicateAgent`] when the identifier
    /// exists or [`AgentRepositoryError::ScopeTaken`] when another agent
    /// already holds the same agent type and platform scope.
    async fn register(&self, registration: &AgentRegistration) -> AgentRepositoryResult<()>;

    /// Persists changes to an existing registration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRepositoryError::NotFound`] when the agent does not
    /// exist.
    async fn update(&self, registration: &AgentRegistration) -> AgentRepositoryResult<()>;

    /// Finds a registration by identifier.
    async fn find_by_id(&self, id: AgentId) -> AgentRepositoryResult<Option<AgentRegistration>>;

    /// Finds the registration holding exactly this scope.
    ///
    /// `None` as platform selects the global registration; there is no
    /// fallback at this level.
    async fn find_by_scope(
        &self,
        agent_type: AgentType,
        platform_id: Option<PlatformId>,
    ) -> AgentRepositoryResult<Option<AgentRegistration>>;

    /// Returns every registration in registration order.
    async fn list_all(&self) -> AgentRepositoryResult<Vec<AgentRegistration>>;

    /// Removes a registration and releases its scope.
    ///
    /// # Errors
    ///
    /// Returns [`AgentRepositoryError::NotFound`] when the agent does not
    /// exist.
    async fn remove(&self, id: AgentId) -> AgentRepositoryResult<AgentRegistration>;
}

/// Errors returned by agent repository implementations.
#[derive(Debug, Clone, Error)]
pub enum AgentRepositoryError {
    /// An agent with the same identifier already exists.
    #[error("duplicate agent identifier: {0}")]
    DuplicateAgent(AgentId),

    /// Another agent holds the same agent type and platform scope.
    #[error("agent type '{agent_type}' is already registered for {}", scope_label(.platform_id.as_ref()))]
    ScopeTaken {
        /// Contested agent type.
        agent_type: AgentType,
        /// Contested platform, `None` for the global scope.
        platform_id: Option<PlatformId>,
    },

    /// The agent was not found.
    #[error("agent not found: {0}")]
    NotFound(AgentId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl AgentRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

pub(crate) fn scope_label(platform_id: Option<&PlatformId>) -> String {
    platform_id.map_or_else(
        || String::from("the global scope"),
        |id| format!("platform '{id}'"),
    )
}
