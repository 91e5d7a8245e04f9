//! Stage table: which stages each workflow type runs, in which order, and
//! which agent serves each stage.
//!
//! The table is constructed once and shared behind an `Arc`; it holds no
//! hidden state.

mod error;
mod name;
mod table;
mod workflow_type;

pub use error::{ParseWorkflowTypeError, StageError, UnknownStageError};
pub use name::{Stage, names};
pub use table::{StageRoute, StageTable, StageTableBuilder};
pub use workflow_type::WorkflowType;
