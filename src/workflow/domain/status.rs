//! Workflow lifecycle status.

use super::ParseWorkflowStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a workflow.
///
/// While [`WorkflowStatus::Running`], the workflow's current stage names the
/// state-machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created, first stage not yet dispatched.
    Initiated,
    /// Executing the current stage.
    Running,
    /// Suspended by an explicit command.
    Paused,
    /// Every stage succeeded.
    Completed,
    /// A stage failed or timed out.
    Failed,
    /// Stopped by an explicit command.
    Cancelled,
}

impl WorkflowStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Initiated,
        Self::Running,
        Self::Paused,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` for completed, failed and cancelled.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for WorkflowStatus {
    type Error = ParseWorkflowStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| ParseWorkflowStatusError(value.to_owned()))
    }
}
