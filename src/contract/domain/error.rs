//! Error types for contract construction, migration and registration.

use super::{FieldError, SemVer};
use crate::envelope::{AgentType, ErrorCode, PlatformId};
use thiserror::Error;

/// Errors returned by contract and registry operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    /// A version string is not `major.minor.patch`.
    #[error("invalid semantic version '{0}'")]
    InvalidVersion(String),

    /// The contract definition failed its sanity checks.
    #[error("invalid contract '{name}': {}", format_field_errors(.errors))]
    InvalidDefinition {
        /// Contract name.
        name: String,
        /// Individual definition problems.
        errors: Vec<FieldError>,
    },

    /// A contract is already registered for the agent type and scope.
    #[error("CONFLICT: contract for agent type '{agent_type}' already registered{}", scope_suffix(.platform.as_ref()))]
    Conflict {
        /// Agent type of the duplicate registration.
        agent_type: AgentType,
        /// Platform scope of the duplicate registration.
        platform: Option<PlatformId>,
    },

    /// The contract's schemas could not be recorded in the schema registry.
    #[error(transparent)]
    Schema(#[from] SchemaRegistryError),

    /// A payload migration could not transform its input.
    #[error("migration {key} failed: {reason}")]
    MigrationFailed {
        /// Migration key in `from->to` form.
        key: String,
        /// Failure description.
        reason: String,
    },
}

impl ContractError {
    /// Returns the taxonomy code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Conflict { .. } | Self::Schema(SchemaRegistryError::VersionConflict { .. }) => {
                ErrorCode::Conflict
            }
            Self::InvalidVersion(_)
            | Self::InvalidDefinition { .. }
            | Self::Schema(SchemaRegistryError::InvalidName(_))
            | Self::MigrationFailed { .. } => ErrorCode::EnvelopeValidationError,
        }
    }

    /// Creates a migration failure.
    #[must_use]
    pub fn migration_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MigrationFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Errors returned while populating a schema registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaRegistryError {
    /// A schema name was re-registered with a different version.
    #[error("schema '{name}' already registered at version {existing}, refusing {requested}")]
    VersionConflict {
        /// Schema name.
        name: String,
        /// Version already registered.
        existing: SemVer,
        /// Version that was refused.
        requested: SemVer,
    },

    /// Schema names must be non-blank.
    #[error("invalid schema name '{0}'")]
    InvalidName(String),
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn scope_suffix(platform: Option<&PlatformId>) -> String {
    platform.map_or_else(String::new, |id| format!(" for platform '{id}'"))
}
