//! Task envelope sent from the orchestrator to an agent.

use super::{Action, AgentType, EnvelopeError, TaskId, TaskPayload, WorkflowId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default agent deadline for a single attempt.
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;

/// Default attempt budget for a task.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Lifecycle status carried on a task envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Built but not yet published.
    Pending,
    /// Published and awaiting a result.
    Dispatched,
    /// A successful result was accepted.
    Succeeded,
    /// A failure result was accepted or attempts were exhausted.
    Failed,
    /// The latest attempt expired without a result.
    TimedOut,
}

/// Scheduling priority hint for agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background work.
    Low,
    /// Regular pipeline work.
    #[default]
    Normal,
    /// Expedited work such as hotfixes.
    High,
    /// Work that should pre-empt everything else.
    Critical,
}

/// Distributed-tracing identifiers propagated across agent boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// Trace identifier shared by every span of one workflow.
    pub trace_id: String,
    /// Identifier of the span that produced the envelope.
    pub span_id: String,
    /// Identifier of the parent span, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
}

impl TraceContext {
    /// Starts a new trace with a root span.
    #[must_use]
    pub fn root() -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: new_span_id(),
            parent_span_id: None,
        }
    }

    /// Creates a child span within the same trace.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: new_span_id(),
            parent_span_id: Some(self.span_id.clone()),
        }
    }
}

fn new_span_id() -> String {
    let mut span = Uuid::new_v4().simple().to_string();
    span.truncate(16);
    span
}

/// Unit of work dispatched to an agent.
///
/// The `action` field selects the shape of `payload`; use
/// [`TaskEnvelope::typed_payload`] to decode it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Task identifier.
    pub task_id: TaskId,
    /// Owning workflow.
    pub workflow_id: WorkflowId,
    /// Agent type whose queue receives the task.
    pub agent_type: AgentType,
    /// Payload discriminator.
    pub action: Action,
    /// Payload body selected by `action`.
    pub payload: Value,
    /// Lifecycle status at the time of publishing.
    pub status: TaskStatus,
    /// Scheduling hint.
    #[serde(default)]
    pub priority: Priority,
    /// Number of re-publishes performed so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Total attempt budget.
    pub max_retries: u32,
    /// Per-attempt deadline in milliseconds.
    pub timeout_ms: u64,
    /// Contract version the payload conforms to.
    pub version: String,
    /// Tracing identifiers.
    pub trace: TraceContext,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TaskEnvelope {
    /// Starts building an envelope for `payload` routed to `agent_type`.
    #[must_use]
    pub fn builder(
        workflow_id: WorkflowId,
        agent_type: AgentType,
        payload: TaskPayload,
    ) -> TaskEnvelopeBuilder {
        TaskEnvelopeBuilder {
            workflow_id,
            agent_type,
            payload,
            priority: Priority::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            version: String::from("1.0.0"),
            trace: None,
        }
    }

    /// Decodes the payload into its typed variant.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::PayloadMismatch`] if the body does not match
    /// the variant selected by `action`.
    pub fn typed_payload(&self) -> Result<TaskPayload, EnvelopeError> {
        TaskPayload::from_wire(self.action, &self.payload)
    }

    /// Returns the `{action, payload}` pair validated by contract input
    /// schemas.
    #[must_use]
    pub fn contract_candidate(&self) -> Value {
        serde_json::json!({
            "action": self.action.as_str(),
            "payload": self.payload,
        })
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
    /// task envelope.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        serde_json::from_value(value).map_err(|err| EnvelopeError::Serialization(err.to_string()))
    }

    /// Returns a copy prepared for the next attempt.
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count.saturating_add(1),
            status: TaskStatus::Dispatched,
            trace: self.trace.child(),
            ..self.clone()
        }
    }

    /// Returns `true` if another attempt fits within the budget.
    #[must_use]
    pub const fn has_attempts_left(&self) -> bool {
        self.retry_count.saturating_add(1) < self.max_retries
    }
}

/// Builder for [`TaskEnvelope`].
#[derive(Debug, Clone)]
pub struct TaskEnvelopeBuilder {
    workflow_id: WorkflowId,
    agent_type: AgentType,
    payload: TaskPayload,
    priority: Priority,
    max_retries: u32,
    timeout_ms: u64,
    version: String,
    trace: Option<TraceContext>,
}

impl TaskEnvelopeBuilder {
    /// Sets the scheduling priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the total attempt budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the per-attempt deadline.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the contract version the payload conforms to.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Continues an existing trace instead of starting a new one.
    #[must_use]
    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Builds the envelope in `pending` status.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Serialization`] if the payload cannot be
    /// encoded.
    pub fn build(self, clock: &impl Clock) -> Result<TaskEnvelope, EnvelopeError> {
        let (action, payload) = self.payload.into_wire()?;
        Ok(TaskEnvelope {
            task_id: TaskId::new(),
            workflow_id: self.workflow_id,
            agent_type: self.agent_type,
            action,
            payload,
            status: TaskStatus::Pending,
            priority: self.priority,
            retry_count: 0,
            max_retries: self.max_retries,
            timeout_ms: self.timeout_ms,
            version: self.version,
            trace: self.trace.map_or_else(TraceContext::root, |trace| trace.child()),
            created_at: clock.utc(),
        })
    }
}
