//! Versioned boundary definitions for agent types.

use super::{ContractError, Schema, SemVer};
use crate::envelope::AgentType;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Number of prior versions accepted alongside the current one.
pub const SUPPORTED_PRIOR_VERSIONS: usize = 2;

/// Builds the `"from->to"` key used to look up migrations.
#[must_use]
pub fn migration_key(from: &str, to: &str) -> String {
    format!("{}->{}", from.trim(), to.trim())
}

/// Transformation from an older message shape to the current one.
///
/// Implementations should be deterministic and preserve every value that
/// maps onto the newer schema.
pub trait PayloadMigration: Send + Sync {
    /// Transforms `value` into the shape expected by the target version.
    ///
    /// # Errors
    ///
    /// Returns a failure description when the value cannot be migrated.
    fn migrate(&self, value: Value) -> Result<Value, String>;
}

impl<F> PayloadMigration for F
where
    F: Fn(Value) -> Result<Value, String> + Send + Sync,
{
    fn migrate(&self, value: Value) -> Result<Value, String> {
        self(value)
    }
}

/// One step of a declarative [`FieldMigration`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldStep {
    /// Moves a field to a new name when present.
    Rename {
        /// Original field name.
        from: String,
        /// New field name.
        to: String,
    },
    /// Inserts a field when absent.
    Default {
        /// Field name.
        field: String,
        /// Value to insert.
        value: Value,
    },
    /// Removes a field when present.
    Remove {
        /// Field name.
        field: String,
    },
}

/// Declarative migration applying [`FieldStep`]s to one object.
///
/// `pointer` selects the object to rewrite (for example `/payload`); an
/// empty pointer rewrites the root value. Values without anything at
/// `pointer` pass through untouched, so one migration can serve both the
/// request and the response side of a contract.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMigration {
    pointer: String,
    steps: Vec<FieldStep>,
}

impl FieldMigration {
    /// Creates a migration rewriting the object at `pointer`.
    #[must_use]
    pub fn at(pointer: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
            steps: Vec::new(),
        }
    }

    /// Adds a rename step.
    #[must_use]
    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.steps.push(FieldStep::Rename {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Adds a default-value step.
    #[must_use]
    pub fn default_value(mut self, field: impl Into<String>, value: Value) -> Self {
        self.steps.push(FieldStep::Default {
            field: field.into(),
            value,
        });
        self
    }

    /// Adds a removal step.
    #[must_use]
    pub fn remove(mut self, field: impl Into<String>) -> Self {
        self.steps.push(FieldStep::Remove {
            field: field.into(),
        });
        self
    }

    fn apply_steps(&self, fields: &mut Map<String, Value>) {
        for step in &self.steps {
            match step {
                FieldStep::Rename { from, to } => {
                    if let Some(moved) = fields.remove(from) {
                        fields.insert(to.clone(), moved);
                    }
                }
                FieldStep::Default { field, value } => {
                    fields.entry(field.clone()).or_insert_with(|| value.clone());
                }
                FieldStep::Remove { field } => {
                    fields.remove(field);
                }
            }
        }
    }
}

impl PayloadMigration for FieldMigration {
    fn migrate(&self, mut value: Value) -> Result<Value, String> {
        if !self.pointer.is_empty() && value.pointer(&self.pointer).is_none() {
            return Ok(value);
        }
        let target = if self.pointer.is_empty() {
            Some(&mut value)
        } else {
            value.pointer_mut(&self.pointer)
        };
        let fields = target
            .and_then(Value::as_object_mut)
            .ok_or_else(|| format!("expected an object at '{}'", self.pointer))?;
        self.apply_steps(fields);
        Ok(value)
    }
}

/// Versioned request/response definition for one agent type.
///
/// Version strings are kept as declared so that
/// [`crate::contract::validation::validate_contract_definition`] can report
/// malformed values instead of failing at construction.
#[derive(Clone)]
pub struct Contract {
    name: String,
    agent_type: AgentType,
    version: String,
    supported_versions: Vec<String>,
    input_schema: Option<Schema>,
    output_schema: Option<Schema>,
    migrations: BTreeMap<String, Arc<dyn PayloadMigration>>,
    breaking_changes: BTreeMap<String, Vec<String>>,
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("name", &self.name)
            .field("agent_type", &self.agent_type)
            .field("version", &self.version)
            .field("supported_versions", &self.supported_versions)
            .field("migrations", &self.migrations.keys().collect::<Vec<_>>())
            .field("breaking_changes", &self.breaking_changes)
            .finish_non_exhaustive()
    }
}

impl Contract {
    /// Starts building a contract. `version` is also the first supported
    /// version.
    #[must_use]
    pub fn builder(
        name: impl Into<String>,
        agent_type: AgentType,
        version: impl Into<String>,
    ) -> ContractBuilder {
        let current = version.into();
        ContractBuilder {
            contract: Self {
                name: name.into(),
                agent_type,
                supported_versions: vec![current.clone()],
                version: current,
                input_schema: None,
                output_schema: None,
                migrations: BTreeMap::new(),
                breaking_changes: BTreeMap::new(),
            },
        }
    }

    /// Returns the contract name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the agent type governed by the contract.
    #[must_use]
    pub const fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    /// Returns the current version as declared.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Parses the current version.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::InvalidVersion`] for malformed versions.
    pub fn current_version(&self) -> Result<SemVer, ContractError> {
        SemVer::parse(&self.version)
    }

    /// Returns the versions accepted on input.
    #[must_use]
    pub fn supported_versions(&self) -> &[String] {
        &self.supported_versions
    }

    /// Returns the request schema, if defined.
    #[must_use]
    pub const fn input_schema(&self) -> Option<&Schema> {
        self.input_schema.as_ref()
    }

    /// Returns the response schema, if defined.
    #[must_use]
    pub const fn output_schema(&self) -> Option<&Schema> {
        self.output_schema.as_ref()
    }

    /// Returns the migration registered for `from->to`, if any.
    #[must_use]
    pub fn migration(&self, from: &str, to: &str) -> Option<&Arc<dyn PayloadMigration>> {
        self.migrations.get(&migration_key(from, to))
    }

    /// Returns the keys of every registered migration.
    pub fn migration_keys(&self) -> impl Iterator<Item = &str> {
        self.migrations.keys().map(String::as_str)
    }

    /// Returns the breaking changes recorded per version.
    #[must_use]
    pub const fn breaking_changes(&self) -> &BTreeMap<String, Vec<String>> {
        &self.breaking_changes
    }

    /// Returns `true` if `version` is listed as supported.
    #[must_use]
    pub fn supports(&self, version: &str) -> bool {
        let wanted = version.trim();
        self.supported_versions.iter().any(|v| v.trim() == wanted)
    }

    /// Returns a copy of this contract with an extra migration.
    ///
    /// Registered contracts are immutable; use this to derive a new
    /// definition before registration.
    #[must_use]
    pub fn with_migration(
        &self,
        from: &str,
        to: &str,
        migration: impl PayloadMigration + 'static,
    ) -> Self {
        let mut derived = self.clone();
        derived
            .migrations
            .insert(migration_key(from, to), Arc::new(migration));
        derived
    }
}

/// Builder for [`Contract`].
#[derive(Debug, Clone)]
pub struct ContractBuilder {
    contract: Contract,
}

impl ContractBuilder {
    /// Replaces the supported version list.
    #[must_use]
    pub fn supported_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contract.supported_versions = versions.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the request schema.
    #[must_use]
    pub fn input_schema(mut self, schema: Schema) -> Self {
        self.contract.input_schema = Some(schema);
        self
    }

    /// Sets the response schema.
    #[must_use]
    pub fn output_schema(mut self, schema: Schema) -> Self {
        self.contract.output_schema = Some(schema);
        self
    }

    /// Registers a migration from `from` to `to`.
    #[must_use]
    pub fn migration(
        mut self,
        from: &str,
        to: &str,
        migration: impl PayloadMigration + 'static,
    ) -> Self {
        self.contract
            .migrations
            .insert(migration_key(from, to), Arc::new(migration));
        self
    }

    /// Records a breaking change introduced by `version`.
    #[must_use]
    pub fn breaking_change(
        mut self,
        version: impl Into<String>,
        change: impl Into<String>,
    ) -> Self {
        self.contract
            .breaking_changes
            .entry(version.into())
            .or_default()
            .push(change.into());
        self
    }

    /// Finishes the contract without validating it.
    #[must_use]
    pub fn build(self) -> Contract {
        self.contract
    }
}
