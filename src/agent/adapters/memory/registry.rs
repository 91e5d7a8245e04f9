//! Thread-safe in-memory agent repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::agent::{
    domain::{AgentId, AgentRegistration},
    ports::{AgentRepository, AgentRepositoryError, AgentRepositoryResult},
};
use crate::envelope::{AgentType, PlatformId};

type Scope = (AgentType, Option<PlatformId>);

/// In-memory agent repository keyed by identifier and scope.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAgentRepository {
    state: Arc<RwLock<RepositoryState>>,
}

#[derive(Debug, Default)]
struct RepositoryState {
    agents: HashMap<AgentId, AgentRegistration>,
    scope_index: HashMap<Scope, AgentId>,
    order: Vec<AgentId>,
}

impl InMemoryAgentRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn scope_of(registration: &AgentRegistration) -> Scope {
    (
        registration.agent_type(),
        registration.platform_id().cloned(),
    )
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn register(&self, registration: &AgentRegistration) -> AgentRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| {
            AgentRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;

        if state.agents.contains_key(&registration.id()) {
            return Err(AgentRepositoryError::DuplicateAgent(registration.id()));
        }
        let scope = scope_of(registration);
        if state.scope_index.contains_key(&scope) {
            let (agent_type, platform_id) = scope;
            return Err(AgentRepositoryError::ScopeTaken {
                agent_type,
                platform_id,
            });
        }

        state.scope_index.insert(scope, registration.id());
        state.order.push(registration.id());
        state
            .agents
            .insert(registration.id(), registration.clone());
        Ok(())
    }

    async fn update(&self, registration: &AgentRegistration) -> AgentRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| {
            AgentRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let stored = state
            .agents
            .get_mut(&registration.id())
            .ok_or(AgentRepositoryError::NotFound(registration.id()))?;
        *stored = registration.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: AgentId) -> AgentRepositoryResult<Option<AgentRegistration>> {
        let state = self.state.read().map_err(|err| {
            AgentRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(state.agents.get(&id).cloned())
    }

    async fn find_by_scope(
        &self,
        agent_type: AgentType,
        platform_id: Option<PlatformId>,
    ) -> AgentRepositoryResult<Option<AgentRegistration>> {
        let state = self.state.read().map_err(|err| {
            AgentRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let found = state
            .scope_index
            .get(&(agent_type, platform_id))
            .and_then(|id| state.agents.get(id))
            .cloned();
        Ok(found)
    }

    async fn list_all(&self) -> AgentRepositoryResult<Vec<AgentRegistration>> {
        let state = self.state.read().map_err(|err| {
            AgentRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.agents.get(id))
            .cloned()
            .collect())
    }

    async fn remove(&self, id: AgentId) -> AgentRepositoryResult<AgentRegistration> {
        let mut state = self.state.write().map_err(|err| {
            AgentRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let removed = state
            .agents
            .remove(&id)
            .ok_or(AgentRepositoryError::NotFound(id))?;
        state.scope_index.remove(&scope_of(&removed));
        state.order.retain(|held| *held != id);
        Ok(removed)
    }
}
