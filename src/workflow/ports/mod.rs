//! Port contracts for workflow persistence.

mod repository;

pub use repository::{
    WorkflowEventLog, WorkflowFilter, WorkflowRepository, WorkflowRepositoryError,
    WorkflowRepositoryResult,
};
