//! Port contracts for agent registration persistence.

mod repository;

#[cfg(test)]
pub use repository::MockAgentRepository;
pub(crate) use repository::scope_label;
pub use repository::{AgentRepository, AgentRepositoryError, AgentRepositoryResult};
