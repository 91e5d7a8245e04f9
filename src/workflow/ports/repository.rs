//! Persistence ports for workflow snapshots and their audit trail.

use crate::envelope::WorkflowId;
use crate::stage::WorkflowType;
use crate::workflow::domain::{EventId, Workflow, WorkflowEvent, WorkflowStatus};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for workflow repository operations.
pub type WorkflowRepositoryResult<T> = Result<T, WorkflowRepositoryError>;

/// Criteria for listing workflows. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkflowFilter {
    workflow_type: Option<WorkflowType>,
    status: Option<WorkflowStatus>,
    limit: Option<usize>,
}

impl WorkflowFilter {
    /// Creates a filter matching every workflow.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            workflow_type: None,
            status: None,
            limit: None,
        }
    }

    /// Restricts to one workflow type.
    #[must_use]
    pub const fn with_type(mut self, workflow_type: WorkflowType) -> Self {
        self.workflow_type = Some(workflow_type);
        self
    }

    /// Restricts to one status.
    #[must_use]
    pub const fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Caps the number of returned workflows.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the maximum number of results, if capped.
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Returns `true` if `workflow` satisfies the type and status criteria.
    #[must_use]
    pub fn matches(&self, workflow: &Workflow) -> bool {
        self.workflow_type
            .is_none_or(|wanted| workflow.workflow_type() == wanted)
            && self.status.is_none_or(|wanted| workflow.status() == wanted)
    }
}

/// Snapshot store holding one record per workflow.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Stores a new workflow.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowRepositoryError::DuplicateWorkflow`] when the
    /// identifier already exists.
    async fn store(&self, workflow: &Workflow) -> WorkflowRepositoryResult<()>;

    /// Replaces the snapshot of an existing workflow.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowRepositoryError::NotFound`] when the workflow does
    /// not exist.
    async fn update(&self, workflow: &Workflow) -> WorkflowRepositoryResult<()>;

    /// Finds a workflow by identifier.
    ///
    /// Returns `None` when the workflow does not exist.
    async fn find_by_id(&self, id: WorkflowId) -> WorkflowRepositoryResult<Option<Workflow>>;

    /// Lists workflows matching `filter`, oldest first.
    async fn list(&self, filter: &WorkflowFilter) -> WorkflowRepositoryResult<Vec<Workflow>>;
}

/// Append-only audit log keyed by workflow.
#[async_trait]
pub trait WorkflowEventLog: Send + Sync {
    /// Appends `event`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowRepositoryError::DuplicateEvent`] when the event was
    /// already appended.
    async fn append(&self, event: &WorkflowEvent) -> WorkflowRepositoryResult<()>;

    /// Returns every event of `workflow_id` ordered by creation time.
    async fn events_for(&self, workflow_id: WorkflowId)
    -> WorkflowRepositoryResult<Vec<WorkflowEvent>>;
}

/// Errors returned by workflow persistence implementations.
#[derive(Debug, Clone, Error)]
pub enum WorkflowRepositoryError {
    /// A workflow with the same identifier already exists.
    #[error("duplicate workflow identifier: {0}")]
    DuplicateWorkflow(WorkflowId),

    /// The workflow was not found.
    #[error("workflow not found: {0}")]
    NotFound(WorkflowId),

    /// The event was already appended.
    #[error("duplicate event identifier: {0}")]
    DuplicateEvent(EventId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl WorkflowRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
