//! Error types for dispatch operations.

use crate::bus::BusError;
use crate::envelope::{EnvelopeError, TaskId, WorkflowId};
use crate::stage::Stage;
use thiserror::Error;

/// Result type for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors returned by the agent dispatcher.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// A task is already in flight for the workflow and stage.
    #[error("task {pending} is already pending for workflow {workflow_id} at stage '{stage}'")]
    AlreadyPending {
        /// Workflow owning the slot.
        workflow_id: WorkflowId,
        /// Stage owning the slot.
        stage: Stage,
        /// Task currently holding the slot.
        pending: TaskId,
    },

    /// The same task identifier was dispatched twice.
    #[error("task {0} is already pending")]
    DuplicateTask(TaskId),

    /// The envelope could not be encoded.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// The bus refused the publish.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Nobody is consuming dispatch outcomes any more.
    #[error("dispatch outcome receiver has been dropped")]
    OutcomeChannelClosed,
}
