//! Wire envelopes exchanged between the orchestrator and agents.
//!
//! A [`TaskEnvelope`] travels on `agent:{agent_type}:tasks`; the matching
//! [`ResultEnvelope`] comes back on [`RESULTS_CHANNEL`]. Payloads are typed
//! through [`TaskPayload`], a sum type discriminated by [`Action`].

mod agent_type;
mod error;
mod ids;
mod payload;
mod result;
mod task;

pub use agent_type::{
    AgentType, HEARTBEAT_CHANNEL, REGISTRATION_CHANNEL, RESULTS_CHANNEL, WORKFLOW_EVENTS_CHANNEL,
};
pub use error::{AgentError, EnvelopeError, ErrorCode, ParseActionError, ParseAgentTypeError};
pub use ids::{PlatformId, TaskId, WorkflowId};
pub use payload::{Action, TaskPayload};
pub use result::{ResultEnvelope, ResultMetrics, ResultStatus};
pub use task::{
    DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS, Priority, TaskEnvelope, TaskEnvelopeBuilder,
    TaskStatus, TraceContext,
};
