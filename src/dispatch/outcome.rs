//! Settled tasks forwarded to the orchestrator.

use crate::envelope::{AgentError, ResultEnvelope, TaskEnvelope, WorkflowId};
use crate::stage::Stage;

/// A task the dispatcher no longer owns.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// An agent answered.
    Result {
        /// Stage the task served.
        stage: Stage,
        /// Envelope as last published.
        task: TaskEnvelope,
        /// The agent's answer.
        result: ResultEnvelope,
    },
    /// Every attempt timed out.
    RetryExhausted {
        /// Stage the task served.
        stage: Stage,
        /// Envelope as last published.
        task: TaskEnvelope,
        /// `TIMEOUT` error describing the exhausted budget.
        error: AgentError,
    },
}

impl DispatchOutcome {
    /// Returns the workflow the task belonged to.
    #[must_use]
    pub const fn workflow_id(&self) -> WorkflowId {
        match self {
            Self::Result { task, .. } | Self::RetryExhausted { task, .. } => task.workflow_id,
        }
    }

    /// Returns the stage the task served.
    #[must_use]
    pub const fn stage(&self) -> &Stage {
        match self {
            Self::Result { stage, .. } | Self::RetryExhausted { stage, .. } => stage,
        }
    }

    /// Returns the settled task envelope.
    #[must_use]
    pub const fn task(&self) -> &TaskEnvelope {
        match self {
            Self::Result { task, .. } | Self::RetryExhausted { task, .. } => task,
        }
    }
}
