//! Stage names.

use super::StageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage names used by the built-in table.
pub mod names {
    /// Requirement analysis and workspace preparation.
    pub const INITIALIZATION: &str = "initialization";
    /// Project skeleton generation.
    pub const SCAFFOLDING: &str = "scaffolding";
    /// Feature implementation in an existing project.
    pub const IMPLEMENTATION: &str = "implementation";
    /// Static analysis, tests and coverage checks.
    pub const VALIDATION: &str = "validation";
    /// End-to-end test generation and execution.
    pub const E2E_TESTING: &str = "e2e_testing";
    /// Branch merge into the target branch.
    pub const INTEGRATION: &str = "integration";
    /// Image build and rollout.
    pub const DEPLOYMENT: &str = "deployment";
}

/// Name of a pipeline stage, for example `validation`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Stage(String);

impl Stage {
    /// Validates and creates a stage name.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::InvalidName`] unless the trimmed value is a
    /// non-empty lowercase `snake_case` identifier.
    pub fn new(value: impl Into<String>) -> Result<Self, StageError> {
        let raw = value.into();
        let trimmed = raw.trim();
        let valid = trimmed
            .chars()
            .next()
            .is_some_and(|first| first.is_ascii_lowercase())
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_');
        if !valid {
            return Err(StageError::InvalidName(raw));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the stage name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Stage {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Stage {
    type Error = StageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Stage {
    type Error = StageError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Stage> for String {
    fn from(stage: Stage) -> Self {
        stage.0
    }
}
