//! Append-only audit records of workflow activity.

use crate::envelope::WorkflowId;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEventType {
    /// The workflow record was created.
    Created,
    /// The first stage started.
    Started,
    /// A stage succeeded and the next one started.
    StageAdvanced,
    /// The last stage succeeded.
    Completed,
    /// The workflow failed; the payload carries the error code.
    Failed,
    /// The workflow was paused.
    Paused,
    /// The workflow was resumed.
    Resumed,
    /// The workflow was cancelled.
    Cancelled,
    /// A task was published to an agent.
    TaskDispatched,
    /// A failed task was published again.
    TaskRetried,
    /// An agent result was received.
    ResultReceived,
    /// Every attempt of a task timed out.
    TaskTimedOut,
    /// A result or timeout arrived for an inactive workflow or stage.
    OutcomeDiscarded,
}

impl WorkflowEventType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::StageAdvanced => "stage_advanced",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
            Self::Cancelled => "cancelled",
            Self::TaskDispatched => "task_dispatched",
            Self::TaskRetried => "task_retried",
            Self::ResultReceived => "result_received",
            Self::TaskTimedOut => "task_timed_out",
            Self::OutcomeDiscarded => "outcome_discarded",
        }
    }
}

impl fmt::Display for WorkflowEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit row. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    id: EventId,
    workflow_id: WorkflowId,
    event_type: WorkflowEventType,
    payload: Value,
    created_at: DateTime<Utc>,
}

impl WorkflowEvent {
    /// Creates an event stamped with the current clock time.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        event_type: WorkflowEventType,
        payload: Value,
        clock: &impl Clock,
    ) -> Self {
        Self {
            id: EventId::new(),
            workflow_id,
            event_type,
            payload,
            created_at: clock.utc(),
        }
    }

    /// Returns the event identifier.
    #[must_use]
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Returns the workflow the event belongs to.
    #[must_use]
    pub const fn workflow_id(&self) -> WorkflowId {
        self.workflow_id
    }

    /// Returns the event kind.
    #[must_use]
    pub const fn event_type(&self) -> WorkflowEventType {
        self.event_type
    }

    /// Returns the event payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
