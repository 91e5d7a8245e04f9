//! Workflow aggregate, lifecycle status and audit events.

mod error;
mod event;
mod status;
mod workflow;

pub use error::{ParseWorkflowStatusError, WorkflowDomainError};
pub use event::{EventId, WorkflowEvent, WorkflowEventType};
pub use status::WorkflowStatus;
pub use workflow::{FailureInfo, Workflow, WorkflowDraft};
