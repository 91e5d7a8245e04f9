//! Error types for stage lookup and stage table construction.

use super::{Stage, WorkflowType};
use thiserror::Error;

/// A stage was looked up in a sequence that does not contain it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("stage '{stage}' is not part of the {workflow_type} sequence")]
pub struct UnknownStageError {
    /// Stage that was looked up.
    pub stage: Stage,
    /// Workflow type whose sequence was searched.
    pub workflow_type: WorkflowType,
}

/// Errors returned while building a stage table.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    /// Stage names must be lowercase `snake_case` identifiers.
    #[error("invalid stage name '{0}', expected lowercase snake_case")]
    InvalidName(String),

    /// A sequence contains no stages.
    #[error("stage sequence for {} is empty", describe(.0.as_ref()))]
    EmptySequence(Option<WorkflowType>),

    /// A stage occurs more than once in one sequence.
    #[error("stage '{stage}' appears twice in the {} sequence", describe(.workflow_type.as_ref()))]
    DuplicateStage {
        /// Repeated stage.
        stage: Stage,
        /// Sequence owner; `None` for the default sequence.
        workflow_type: Option<WorkflowType>,
    },

    /// A sequenced stage has no agent route.
    #[error("stage '{0}' has no agent route")]
    MissingRoute(Stage),

    /// The lookup itself failed.
    #[error(transparent)]
    Unknown(#[from] UnknownStageError),
}

/// Error returned while parsing workflow types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown workflow type: {0}")]
pub struct ParseWorkflowTypeError(pub String);

fn describe(workflow_type: Option<&WorkflowType>) -> String {
    workflow_type.map_or_else(|| "default".to_owned(), ToString::to_string)
}
