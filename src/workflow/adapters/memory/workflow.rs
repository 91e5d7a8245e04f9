//! In-memory workflow snapshot store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::envelope::WorkflowId;
use crate::workflow::{
    domain::Workflow,
    ports::{WorkflowFilter, WorkflowRepository, WorkflowRepositoryError, WorkflowRepositoryResult},
};

/// Thread-safe in-memory workflow repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkflowRepository {
    state: Arc<RwLock<InMemoryWorkflowState>>,
}

#[derive(Debug, Default)]
struct InMemoryWorkflowState {
    workflows: HashMap<WorkflowId, Workflow>,
    insertion_order: Vec<WorkflowId>,
}

impl InMemoryWorkflowRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn store(&self, workflow: &Workflow) -> WorkflowRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| {
            WorkflowRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        if state.workflows.contains_key(&workflow.id()) {
            return Err(WorkflowRepositoryError::DuplicateWorkflow(workflow.id()));
        }
        state.insertion_order.push(workflow.id());
        state.workflows.insert(workflow.id(), workflow.clone());
        Ok(())
    }

    async fn update(&self, workflow: &Workflow) -> WorkflowRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| {
            WorkflowRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let slot = state
            .workflows
            .get_mut(&workflow.id())
            .ok_or(WorkflowRepositoryError::NotFound(workflow.id()))?;
        *slot = workflow.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: WorkflowId) -> WorkflowRepositoryResult<Option<Workflow>> {
        let state = self.state.read().map_err(|err| {
            WorkflowRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(state.workflows.get(&id).cloned())
    }

    async fn list(&self, filter: &WorkflowFilter) -> WorkflowRepositoryResult<Vec<Workflow>> {
        let state = self.state.read().map_err(|err| {
            WorkflowRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let matching = state
            .insertion_order
            .iter()
            .filter_map(|id| state.workflows.get(id))
            .filter(|workflow| filter.matches(workflow))
            .take(filter.limit().unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(matching)
    }
}
