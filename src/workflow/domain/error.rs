//! Error types for the workflow state machine.

use crate::envelope::WorkflowId;
use crate::stage::{UnknownStageError, WorkflowType};
use thiserror::Error;

/// Errors returned by workflow construction and transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowDomainError {
    /// The workflow name is empty after trimming.
    #[error("workflow name must not be empty")]
    EmptyName,

    /// Workflow parameters must be a JSON object.
    #[error("workflow params must be a JSON object")]
    InvalidParams,

    /// The stage table has no stages for the workflow type.
    #[error("no stages configured for workflow type '{0}'")]
    EmptySequence(WorkflowType),

    /// The requested transition is not allowed from the current state.
    #[error("illegal transition for workflow {workflow_id}: cannot {transition} while {state}")]
    IllegalTransition {
        /// Workflow that rejected the transition.
        workflow_id: WorkflowId,
        /// State label at the time of the request, e.g. `running(validation)`.
        state: String,
        /// Requested transition.
        transition: String,
    },

    /// The current stage is not part of the workflow type's sequence.
    #[error(transparent)]
    UnknownStage(#[from] UnknownStageError),
}

/// Error returned while parsing workflow statuses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown workflow status: {0}")]
pub struct ParseWorkflowStatusError(pub String);
