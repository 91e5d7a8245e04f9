//! Agent dispatcher: turns "run this task" into a correlated
//! request/response exchange over the event bus, with a timeout and a
//! bounded number of attempts per task.
//!
//! Per-task lifecycle: `pending -> dispatched -> {succeeded | failed |
//! timed_out}`, with `timed_out -> dispatched` while attempts remain.
//! Settled tasks leave through the [`DispatchOutcome`] channel.

mod dispatcher;
mod error;
mod outcome;
mod pending;
mod policy;

pub use dispatcher::{AgentDispatcher, ResultDisposition};
pub use error::{DispatchError, DispatchResult};
pub use outcome::DispatchOutcome;
pub use pending::{PendingTable, PendingTask, TimeoutDecision};
pub use policy::RetryPolicy;
