//! In-memory adapters for tests and single-process deployments.

mod event_log;
mod workflow;

pub use event_log::InMemoryWorkflowEventLog;
pub use workflow::InMemoryWorkflowRepository;
