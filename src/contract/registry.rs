//! Immutable schema and contract registries.
//!
//! Both registries are populated through a builder at start-up and are
//! read-only afterwards. Consumers share them behind an `Arc`.

use super::domain::{Contract, ContractError, Schema, SchemaRegistryError, SemVer};
use super::validation::validate_contract_definition;
use crate::envelope::{AgentType, PlatformId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// A named, versioned schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaEntry {
    name: String,
    version: SemVer,
    schema: Schema,
}

impl SchemaEntry {
    /// Returns the schema name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the registered version.
    #[must_use]
    pub const fn version(&self) -> SemVer {
        self.version
    }

    /// Returns the schema.
    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }
}

/// Collects schemas before freezing them into a [`SchemaRegistry`].
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistryBuilder {
    entries: BTreeMap<String, SchemaEntry>,
}

impl SchemaRegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `schema` under `name`.
    ///
    /// Re-registering the same name at the same version is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaRegistryError::VersionConflict`] when `name` is
    /// already registered at another version, or
    /// [`SchemaRegistryError::InvalidName`] for a blank name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        schema: Schema,
        version: SemVer,
    ) -> Result<&mut Self, SchemaRegistryError> {
        let raw_name = name.into();
        let trimmed = raw_name.trim();
        if trimmed.is_empty() {
            return Err(SchemaRegistryError::InvalidName(raw_name));
        }
        if let Some(existing) = self.entries.get(trimmed) {
            if existing.version == version {
                return Ok(self);
            }
            return Err(SchemaRegistryError::VersionConflict {
                name: trimmed.to_owned(),
                existing: existing.version,
                requested: version,
            });
        }
        self.entries.insert(
            trimmed.to_owned(),
            SchemaEntry {
                name: trimmed.to_owned(),
                version,
                schema,
            },
        );
        Ok(self)
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> SchemaRegistry {
        SchemaRegistry {
            entries: self.entries,
        }
    }
}

/// Read-only lookup of named schemas.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: BTreeMap<String, SchemaEntry>,
}

impl SchemaRegistry {
    /// Starts a new builder.
    #[must_use]
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::new()
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name.trim())
    }

    /// Lists registered names in lexical order.
    #[must_use]
    pub fn list(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Returns the version and schema registered under `name`.
    #[must_use]
    pub fn describe(&self, name: &str) -> Option<&SchemaEntry> {
        self.entries.get(name.trim())
    }
}

type ContractKey = (AgentType, Option<PlatformId>);

/// Collects contracts before freezing them into a [`ContractRegistry`].
#[derive(Debug, Default)]
pub struct ContractRegistryBuilder {
    contracts: HashMap<ContractKey, Arc<Contract>>,
    schemas: SchemaRegistryBuilder,
}

impl ContractRegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `contract`, globally or for one platform.
    ///
    /// The definition is validated first. Its input and output schemas are
    /// recorded in the schema registry as `{name}.input` and
    /// `{name}.output`, or `{name}@{platform}.input` and
    /// `{name}@{platform}.output` for a platform override, so an override
    /// may reuse the global contract's name at a new version.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::InvalidDefinition`] when the definition
    /// fails its checks, [`ContractError::Conflict`] when a contract is
    /// already registered for the same agent type and scope, or
    /// [`ContractError::Schema`] when a schema name clashes at a different
    /// version.
    pub fn register(
        &mut self,
        contract: Contract,
        platform: Option<PlatformId>,
    ) -> Result<&mut Self, ContractError> {
        let report = validate_contract_definition(&contract);
        if !report.valid {
            return Err(ContractError::InvalidDefinition {
                name: contract.name().to_owned(),
                errors: report.errors,
            });
        }

        let key = (contract.agent_type(), platform);
        if self.contracts.contains_key(&key) {
            let (agent_type, scope) = key;
            return Err(ContractError::Conflict {
                agent_type,
                platform: scope,
            });
        }

        let version = contract.current_version()?;
        let prefix = schema_prefix(contract.name(), key.1.as_ref());
        if let Some(input) = contract.input_schema() {
            self.schemas
                .register(format!("{prefix}.input"), input.clone(), version)?;
        }
        if let Some(output) = contract.output_schema() {
            self.schemas
                .register(format!("{prefix}.output"), output.clone(), version)?;
        }

        debug!(
            contract = contract.name(),
            agent_type = %key.0,
            platform = key.1.as_ref().map(PlatformId::as_str),
            version = contract.version(),
            "contract registered"
        );
        self.contracts.insert(key, Arc::new(contract));
        Ok(self)
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> ContractRegistry {
        ContractRegistry {
            contracts: self.contracts,
            schemas: self.schemas.build(),
        }
    }
}

fn schema_prefix(name: &str, platform: Option<&PlatformId>) -> String {
    platform.map_or_else(
        || name.to_owned(),
        |scope| format!("{name}@{}", scope.as_str()),
    )
}

/// Read-only lookup of the active contract per agent type and platform.
#[derive(Debug, Default)]
pub struct ContractRegistry {
    contracts: HashMap<ContractKey, Arc<Contract>>,
    schemas: SchemaRegistry,
}

impl ContractRegistry {
    /// Starts a new builder.
    #[must_use]
    pub fn builder() -> ContractRegistryBuilder {
        ContractRegistryBuilder::new()
    }

    /// Resolves the contract for `agent_type`.
    ///
    /// A platform-scoped contract wins over the global one; without a
    /// platform override the global contract is returned.
    #[must_use]
    pub fn resolve(
        &self,
        agent_type: AgentType,
        platform: Option<&PlatformId>,
    ) -> Option<Arc<Contract>> {
        platform
            .and_then(|id| self.contracts.get(&(agent_type, Some(id.clone()))))
            .or_else(|| self.contracts.get(&(agent_type, None)))
            .cloned()
    }

    /// Returns `true` if any contract covers `agent_type`.
    #[must_use]
    pub fn covers(&self, agent_type: AgentType) -> bool {
        self.contracts.keys().any(|(kind, _)| *kind == agent_type)
    }

    /// Returns the number of registered contracts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// Returns `true` when no contract is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Returns the schemas recorded for registered contracts.
    #[must_use]
    pub const fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }
}
