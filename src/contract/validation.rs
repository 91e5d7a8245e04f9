//! Boundary validation against contracts.
//!
//! The functions here never panic and never fail fast. Each returns a
//! [`ValidationReport`] listing every field-level problem found. Messages
//! declaring an older version are migrated to the current version before
//! the schema check.

use super::domain::{Contract, FieldError, SUPPORTED_PRIOR_VERSIONS, Schema, SemVer};
use crate::envelope::{ResultEnvelope, TaskEnvelope};
use serde::Serialize;
use serde_json::Value;

/// Outcome of validating a message or a contract definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Whether validation passed.
    pub valid: bool,
    /// Field-level problems; empty when `valid`.
    pub errors: Vec<FieldError>,
    /// The candidate after migration, present when `valid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Declared version the candidate was migrated from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrated_from: Option<String>,
}

impl ValidationReport {
    fn passed(value: Option<Value>, migrated_from: Option<String>) -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            value,
            migrated_from,
        }
    }

    fn failed(errors: Vec<FieldError>) -> Self {
        Self {
            valid: false,
            errors,
            value: None,
            migrated_from: None,
        }
    }

    fn from_errors(errors: Vec<FieldError>) -> Self {
        if errors.is_empty() {
            Self::passed(None, None)
        } else {
            Self::failed(errors)
        }
    }

    /// Returns the errors joined into one line, for logs and event payloads.
    #[must_use]
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validates a request candidate against the contract's input schema.
#[must_use]
pub fn validate_input(
    contract: &Contract,
    candidate: &Value,
    declared_version: &str,
) -> ValidationReport {
    validate_against(contract, contract.input_schema(), "input", candidate, declared_version)
}

/// Validates a response candidate against the contract's output schema.
#[must_use]
pub fn validate_output(
    contract: &Contract,
    candidate: &Value,
    declared_version: &str,
) -> ValidationReport {
    validate_against(contract, contract.output_schema(), "output", candidate, declared_version)
}

/// Validates the `{action, payload}` pair of a task envelope.
#[must_use]
pub fn check_task(contract: &Contract, task: &TaskEnvelope) -> ValidationReport {
    validate_input(contract, &task.contract_candidate(), &task.version)
}

/// Validates the output of a result envelope.
#[must_use]
pub fn check_result(contract: &Contract, result: &ResultEnvelope) -> ValidationReport {
    validate_output(contract, &result.output, &result.version)
}

fn validate_against(
    contract: &Contract,
    maybe_schema: Option<&Schema>,
    kind: &str,
    candidate: &Value,
    declared_version: &str,
) -> ValidationReport {
    let Some(schema) = maybe_schema else {
        return ValidationReport::failed(vec![FieldError::new(
            "$",
            format!("contract '{}' defines no {kind} schema", contract.name()),
        )]);
    };
    let Ok(declared) = SemVer::parse(declared_version) else {
        return ValidationReport::failed(vec![FieldError::new(
            "$.version",
            format!("'{declared_version}' is not a semantic version"),
        )]);
    };
    let Ok(current) = contract.current_version() else {
        return ValidationReport::failed(vec![FieldError::new(
            "$.version",
            format!("contract '{}' has a malformed version", contract.name()),
        )]);
    };

    let (value, migrated_from) = if declared == current {
        (candidate.clone(), None)
    } else {
        match migrate(contract, candidate, declared, current) {
            Ok(migrated) => (migrated, Some(declared.to_string())),
            Err(error) => return ValidationReport::failed(vec![error]),
        }
    };

    let errors = schema.validate(&value);
    if errors.is_empty() {
        ValidationReport::passed(Some(value), migrated_from)
    } else {
        ValidationReport::failed(errors)
    }
}

fn migrate(
    contract: &Contract,
    candidate: &Value,
    declared: SemVer,
    current: SemVer,
) -> Result<Value, FieldError> {
    let from = declared.to_string();
    let to = current.to_string();
    let Some(migration) = contract.migration(&from, &to) else {
        let message = if contract.supports(&from) {
            format!("no migration registered from {from} to {to}")
        } else {
            format!(
                "version {from} is not supported (accepted: {})",
                contract.supported_versions().join(", ")
            )
        };
        return Err(FieldError::new("$.version", message));
    };
    migration
        .migrate(candidate.clone())
        .map_err(|reason| FieldError::new("$", format!("migration {from}->{to} failed: {reason}")))
}

/// Sanity-checks a contract definition.
///
/// Guards against a misconfigured agent boundary silently accepting
/// anything: the name must be non-blank, versions must be semantic, the
/// current version must be supported, at most two prior versions may be
/// supported, both schemas must be present and every supported prior
/// version needs a migration to the current one.
#[must_use]
pub fn validate_contract_definition(contract: &Contract) -> ValidationReport {
    let mut errors = Vec::new();

    if contract.name().trim().is_empty() {
        errors.push(FieldError::new("$.name", "contract name must not be empty"));
    }

    let current = SemVer::parse(contract.version()).ok();
    if current.is_none() {
        errors.push(FieldError::new(
            "$.version",
            format!("'{}' is not a semantic version", contract.version()),
        ));
    }

    check_supported_versions(contract, current, &mut errors);

    if contract.input_schema().is_none() {
        errors.push(FieldError::new("$.input_schema", "input schema is required"));
    }
    if contract.output_schema().is_none() {
        errors.push(FieldError::new("$.output_schema", "output schema is required"));
    }

    if let Some(current) = current {
        check_migration_keys(contract, current, &mut errors);
    }

    for version in contract.breaking_changes().keys() {
        if SemVer::parse(version).is_err() {
            errors.push(FieldError::new(
                format!("$.breaking_changes.{version}"),
                "breaking change key is not a semantic version",
            ));
        }
    }

    ValidationReport::from_errors(errors)
}

fn check_supported_versions(
    contract: &Contract,
    parsed_current: Option<SemVer>,
    errors: &mut Vec<FieldError>,
) {
    let supported = contract.supported_versions();
    if !contract.supports(contract.version()) {
        errors.push(FieldError::new(
            "$.supported_versions",
            format!("current version {} must be supported", contract.version()),
        ));
    }
    if supported.len() > SUPPORTED_PRIOR_VERSIONS + 1 {
        errors.push(FieldError::new(
            "$.supported_versions",
            format!(
                "at most the current and {SUPPORTED_PRIOR_VERSIONS} prior versions may be supported, found {}",
                supported.len()
            ),
        ));
    }

    for (index, raw) in supported.iter().enumerate() {
        let path = format!("$.supported_versions[{index}]");
        let Ok(version) = SemVer::parse(raw) else {
            errors.push(FieldError::new(path, format!("'{raw}' is not a semantic version")));
            continue;
        };
        let Some(current) = parsed_current else {
            continue;
        };
        if version > current {
            errors.push(FieldError::new(
                path,
                format!("{version} is newer than the current version {current}"),
            ));
        } else if version < current && contract.migration(raw, contract.version()).is_none() {
            errors.push(FieldError::new(
                path,
                format!("supported version {version} has no migration to {current}"),
            ));
        }
    }
}

fn check_migration_keys(contract: &Contract, current: SemVer, errors: &mut Vec<FieldError>) {
    for key in contract.migration_keys() {
        let path = format!("$.migrations.{key}");
        let Some((raw_from, raw_to)) = key.split_once("->") else {
            errors.push(FieldError::new(path, "migration key must be 'from->to'"));
            continue;
        };
        match (SemVer::parse(raw_from), SemVer::parse(raw_to)) {
            (Ok(from), Ok(to)) => {
                if to != current {
                    errors.push(FieldError::new(
                        path,
                        format!("migration targets {to}, expected current version {current}"),
                    ));
                } else if from >= current {
                    errors.push(FieldError::new(
                        path,
                        format!("migration source {from} must be older than {current}"),
                    ));
                }
            }
            _ => errors.push(FieldError::new(path, "migration key versions must be semantic")),
        }
    }
}
