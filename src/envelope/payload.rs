//! Action tags and the typed task payload sum type.

use super::{EnvelopeError, ParseActionError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Discriminator selecting the payload variant carried by a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Analyse the requested project before any code is produced.
    Initialize,
    /// Generate a project skeleton from a template.
    Scaffold,
    /// Implement a feature inside an existing project.
    Implement,
    /// Run quality checks against a project.
    Validate,
    /// Generate and run end-to-end tests.
    RunE2e,
    /// Merge a branch into its target.
    Merge,
    /// Build and roll out a deployment.
    Deploy,
}

impl Action {
    /// Returns the canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Scaffold => "scaffold",
            Self::Implement => "implement",
            Self::Validate => "validate",
            Self::RunE2e => "run_e2e",
            Self::Merge => "merge",
            Self::Deploy => "deploy",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Action {
    type Error = ParseActionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "initialize" => Ok(Self::Initialize),
            "scaffold" => Ok(Self::Scaffold),
            "implement" => Ok(Self::Implement),
            "validate" => Ok(Self::Validate),
            "run_e2e" => Ok(Self::RunE2e),
            "merge" => Ok(Self::Merge),
            "deploy" => Ok(Self::Deploy),
            _ => Err(ParseActionError(value.to_owned())),
        }
    }
}

/// Typed task payload, one variant per [`Action`].
///
/// On the wire the variant is split into the envelope's `action` and
/// `payload` fields; [`TaskPayload::into_wire`] and
/// [`TaskPayload::from_wire`] convert between the two forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Payload for [`Action::Initialize`].
    Initialize {
        /// Name of the project the workflow builds.
        project_name: String,
        /// Free-form project description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        /// Requirement statements to analyse.
        #[serde(default)]
        requirements: Vec<String>,
    },
    /// Payload for [`Action::Scaffold`].
    Scaffold {
        /// Name of the project to generate.
        project_name: String,
        /// Template identifier.
        template: String,
        /// Implementation language.
        language: String,
        /// Optional framework on top of the language.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        framework: Option<String>,
    },
    /// Payload for [`Action::Implement`].
    Implement {
        /// Name of the project being changed.
        project_name: String,
        /// Description of the feature or fix.
        feature: String,
        /// Files the change is expected to touch.
        #[serde(default)]
        files: Vec<String>,
    },
    /// Payload for [`Action::Validate`].
    Validate {
        /// Path of the project under validation.
        project_path: String,
        /// Check names to run, for example `lint` or `security`.
        checks: Vec<String>,
        /// Minimum line coverage percentage.
        coverage_threshold: u8,
    },
    /// Payload for [`Action::RunE2e`].
    RunE2e {
        /// Path of the project under test.
        project_path: String,
        /// Browsers to run the suite against.
        #[serde(default)]
        browsers: Vec<String>,
        /// Whether suites may run in parallel.
        #[serde(default)]
        parallel: bool,
    },
    /// Payload for [`Action::Merge`].
    Merge {
        /// Repository in `owner/repo` form.
        repository: String,
        /// Branch to merge.
        source_branch: String,
        /// Branch receiving the merge.
        target_branch: String,
        /// Merge strategy, for example `squash`.
        strategy: String,
    },
    /// Payload for [`Action::Deploy`].
    Deploy {
        /// Image reference to roll out.
        image: String,
        /// Target environment name.
        environment: String,
        /// Desired replica count.
        replicas: u32,
    },
}

impl TaskPayload {
    /// Returns the discriminator for this payload.
    #[must_use]
    pub const fn action(&self) -> Action {
        match self {
            Self::Initialize { .. } => Action::Initialize,
            Self::Scaffold { .. } => Action::Scaffold,
            Self::Implement { .. } => Action::Implement,
            Self::Validate { .. } => Action::Validate,
            Self::RunE2e { .. } => Action::RunE2e,
            Self::Merge { .. } => Action::Merge,
            Self::Deploy { .. } => Action::Deploy,
        }
    }

    /// Splits the payload into its wire discriminator and body.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Serialization`] if the payload cannot be
    /// encoded as JSON.
    pub fn into_wire(&self) -> Result<(Action, Value), EnvelopeError> {
        let encoded = serde_json::to_value(self)
            .map_err(|err| EnvelopeError::Serialization(err.to_string()))?;
        let body = match encoded {
            Value::Object(mut fields) => fields
                .remove("payload")
                .unwrap_or_else(|| Value::Object(Map::new())),
            _ => {
                return Err(EnvelopeError::Serialization(
                    "tagged payload did not encode as an object".to_owned(),
                ));
            }
        };
        Ok((self.action(), body))
    }

    /// Rebuilds a typed payload from its wire discriminator and body.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::PayloadMismatch`] when the body does not match
    /// the shape selected by `action`.
    pub fn from_wire(action: Action, body: &Value) -> Result<Self, EnvelopeError> {
        let mut tagged = Map::new();
        tagged.insert("action".to_owned(), Value::String(action.as_str().to_owned()));
        tagged.insert("payload".to_owned(), body.clone());
        serde_json::from_value(Value::Object(tagged)).map_err(|err| {
            EnvelopeError::PayloadMismatch {
                action,
                reason: err.to_string(),
            }
        })
    }
}
