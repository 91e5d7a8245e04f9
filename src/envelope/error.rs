//! Error types for envelope construction and the shared error-code taxonomy.

use super::Action;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors returned while building or decoding envelopes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The envelope or payload could not be encoded or decoded.
    #[error("envelope serialization failed: {0}")]
    Serialization(String),

    /// The payload body does not match the shape selected by the action.
    #[error("payload does not match action '{action}': {reason}")]
    PayloadMismatch {
        /// Action that selected the expected payload shape.
        action: Action,
        /// Decoder failure description.
        reason: String,
    },

    /// The platform identifier is empty, too long or contains whitespace.
    #[error("invalid platform identifier '{0}'")]
    InvalidPlatformId(String),
}

/// Error returned while parsing an agent type tag.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown agent type: {0}")]
pub struct ParseAgentTypeError(pub String);

/// Error returned while parsing an action tag.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown action: {0}")]
pub struct ParseActionError(pub String);

/// Error codes carried by failed results and failed workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed or contract-incompatible message. Never retried.
    EnvelopeValidationError,
    /// A result arrived from an agent type other than the one routed to.
    WrongAgentType,
    /// The agent did not answer before the task deadline.
    Timeout,
    /// Usable output that did not meet the stage's completion criteria.
    PartialSuccess,
    /// Unrecoverable agent failure. Never retried.
    FatalError,
    /// Duplicate platform-scoped registration.
    Conflict,
    /// Agent-reported failure that may succeed on another attempt.
    ExecutionFailed,
}

impl ErrorCode {
    /// Returns the canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EnvelopeValidationError => "ENVELOPE_VALIDATION_ERROR",
            Self::WrongAgentType => "WRONG_AGENT_TYPE",
            Self::Timeout => "TIMEOUT",
            Self::PartialSuccess => "PARTIAL_SUCCESS",
            Self::FatalError => "FATAL_ERROR",
            Self::Conflict => "CONFLICT",
            Self::ExecutionFailed => "EXECUTION_FAILED",
        }
    }

    /// Returns `true` when a failure with this code may be retried.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::ExecutionFailed)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error detail attached to a failed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentError {
    /// Taxonomy code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Whether the agent considers another attempt worthwhile.
    #[serde(default)]
    pub recoverable: bool,
}

impl AgentError {
    /// Creates an error detail.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            code,
            message: message.into(),
            recoverable,
        }
    }

    /// Creates a `TIMEOUT` error after `attempts` unanswered dispatches.
    #[must_use]
    pub fn timeout(attempts: u32) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("agent did not respond after {attempts} attempt(s)"),
            false,
        )
    }

    /// Returns `true` if the failure may be retried with remaining budget.
    ///
    /// `FATAL_ERROR` is never retried, whatever the agent reports.
    #[must_use]
    pub const fn allows_retry(&self) -> bool {
        self.recoverable && self.code.is_retryable()
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
