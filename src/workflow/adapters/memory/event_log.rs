//! In-memory append-only event log.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::envelope::WorkflowId;
use crate::workflow::{
    domain::{EventId, WorkflowEvent},
    ports::{WorkflowEventLog, WorkflowRepositoryError, WorkflowRepositoryResult},
};

/// Thread-safe in-memory event log.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkflowEventLog {
    state: Arc<RwLock<InMemoryEventState>>,
}

#[derive(Debug, Default)]
struct InMemoryEventState {
    by_workflow: HashMap<WorkflowId, Vec<WorkflowEvent>>,
    seen: HashSet<EventId>,
}

impl InMemoryWorkflowEventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowEventLog for InMemoryWorkflowEventLog {
    async fn append(&self, event: &WorkflowEvent) -> WorkflowRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| {
            WorkflowRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        if !state.seen.insert(event.id()) {
            return Err(WorkflowRepositoryError::DuplicateEvent(event.id()));
        }
        state
            .by_workflow
            .entry(event.workflow_id())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn events_for(
        &self,
        workflow_id: WorkflowId,
    ) -> WorkflowRepositoryResult<Vec<WorkflowEvent>> {
        let state = self.state.read().map_err(|err| {
            WorkflowRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let mut events = state
            .by_workflow
            .get(&workflow_id)
            .cloned()
            .unwrap_or_default();
        // Stable sort keeps append order for equal timestamps.
        events.sort_by_key(WorkflowEvent::created_at);
        Ok(events)
    }
}
