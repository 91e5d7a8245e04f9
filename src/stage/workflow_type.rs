//! Closed set of workflow types.

use super::ParseWorkflowTypeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of pipeline run; selects the stage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    /// New application from scratch.
    App,
    /// Feature added to an existing project.
    Feature,
    /// Defect fix.
    Bugfix,
    /// New backend service.
    Service,
    /// Urgent production fix.
    Hotfix,
    /// Behaviour-preserving restructuring.
    Refactor,
}

impl WorkflowType {
    /// Every workflow type.
    pub const ALL: [Self; 6] = [
        Self::App,
        Self::Feature,
        Self::Bugfix,
        Self::Service,
        Self::Hotfix,
        Self::Refactor,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Feature => "feature",
            Self::Bugfix => "bugfix",
            Self::Service => "service",
            Self::Hotfix => "hotfix",
            Self::Refactor => "refactor",
        }
    }
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for WorkflowType {
    type Error = ParseWorkflowTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "app" => Ok(Self::App),
            "feature" => Ok(Self::Feature),
            "bugfix" => Ok(Self::Bugfix),
            "service" => Ok(Self::Service),
            "hotfix" => Ok(Self::Hotfix),
            "refactor" => Ok(Self::Refactor),
            _ => Err(ParseWorkflowTypeError(value.to_owned())),
        }
    }
}
