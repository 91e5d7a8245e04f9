//! Result envelope returned by an agent.

use super::{AgentError, AgentType, EnvelopeError, TaskEnvelope, TaskId, TraceContext, WorkflowId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome reported by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// The stage's work completed.
    Success,
    /// The stage's work failed.
    Failure,
    /// Usable output that did not meet the completion criteria.
    Partial,
}

impl ResultStatus {
    /// Returns the canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Partial => "partial",
        }
    }
}

/// Execution measurements reported with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultMetrics {
    /// Wall-clock duration of the attempt.
    pub duration_ms: u64,
    /// CPU time consumed, if measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_ms: Option<u64>,
    /// Peak resident memory, if measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
}

/// Unit of work returned by an agent, correlated by `(task_id, workflow_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    /// Task this result answers.
    pub task_id: TaskId,
    /// Workflow owning the task.
    pub workflow_id: WorkflowId,
    /// Agent type that produced the result.
    pub agent_type: AgentType,
    /// Reported outcome.
    pub status: ResultStatus,
    /// Action-specific output.
    #[serde(default)]
    pub output: Value,
    /// Error detail for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AgentError>,
    /// Execution measurements.
    #[serde(default)]
    pub metrics: ResultMetrics,
    /// Contract version the output conforms to.
    pub version: String,
    /// Tracing identifiers.
    pub trace: TraceContext,
    /// Completion timestamp.
    pub completed_at: DateTime<Utc>,
}

impl ResultEnvelope {
    /// Creates a successful result answering `task`.
    #[must_use]
    pub fn success(task: &TaskEnvelope, output: Value, clock: &impl Clock) -> Self {
        Self::answering(task, ResultStatus::Success, output, None, clock)
    }

    /// Creates a partial result answering `task`.
    #[must_use]
    pub fn partial(task: &TaskEnvelope, output: Value, clock: &impl Clock) -> Self {
        Self::answering(task, ResultStatus::Partial, output, None, clock)
    }

    /// Creates a failed result answering `task`.
    #[must_use]
    pub fn failure(task: &TaskEnvelope, error: AgentError, clock: &impl Clock) -> Self {
        Self::answering(task, ResultStatus::Failure, Value::Null, Some(error), clock)
    }

    fn answering(
        task: &TaskEnvelope,
        status: ResultStatus,
        output: Value,
        error: Option<AgentError>,
        clock: &impl Clock,
    ) -> Self {
        Self {
            task_id: task.task_id,
            workflow_id: task.workflow_id,
            agent_type: task.agent_type,
            status,
            output,
            error,
            metrics: ResultMetrics::default(),
            version: task.version.clone(),
            trace: task.trace.child(),
            completed_at: clock.utc(),
        }
    }

    /// Attaches execution measurements.
    #[must_use]
    pub const fn with_metrics(mut self, metrics: ResultMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Overrides the declared contract version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Encodes the envelope as a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Serialization`] if encoding fails.
    pub fn to_value(&self) -> Result<Value, EnvelopeError> {
        serde_json::to_value(self).map_err(|err| EnvelopeError::Serialization(err.to_string()))
    }

    /// Decodes an envelope from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Serialization`] if the value is not a valid
    /// result envelope.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        serde_json::from_value(value).map_err(|err| EnvelopeError::Serialization(err.to_string()))
    }
}
