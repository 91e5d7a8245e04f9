//! Contracts shipped for the five built-in agent types.
//!
//! Every built-in contract is at [`BUILTIN_CONTRACT_VERSION`] and still
//! accepts the two prior minor versions through field migrations.

use super::domain::{Contract, ContractBuilder, ContractError, FieldMigration, Property, Schema};
use super::registry::{ContractRegistry, ContractRegistryBuilder};
use crate::envelope::{Action, AgentType};
use serde_json::json;

/// Current version of every built-in contract.
pub const BUILTIN_CONTRACT_VERSION: &str = "1.2.0";

const V1_0: &str = "1.0.0";
const V1_1: &str = "1.1.0";

/// Returns the built-in contract for `agent_type`.
#[must_use]
pub fn contract_for(agent_type: AgentType) -> Contract {
    match agent_type {
        AgentType::Scaffold => scaffold_contract(),
        AgentType::Validation => validation_contract(),
        AgentType::E2e => e2e_contract(),
        AgentType::Integration => integration_contract(),
        AgentType::Deployment => deployment_contract(),
    }
}

/// Returns the built-in contracts, one per agent type.
#[must_use]
pub fn builtin_contracts() -> Vec<Contract> {
    AgentType::ALL.iter().copied().map(contract_for).collect()
}

/// Starts a registry builder pre-loaded with the global built-in contracts.
///
/// Platform-scoped overrides can be registered on the returned builder.
///
/// # Errors
///
/// Returns [`ContractError`] if a built-in definition is rejected.
pub fn builtin_registry_builder() -> Result<ContractRegistryBuilder, ContractError> {
    let mut builder = ContractRegistry::builder();
    for contract in builtin_contracts() {
        builder.register(contract, None)?;
    }
    Ok(builder)
}

/// Builds a registry holding only the global built-in contracts.
///
/// # Errors
///
/// Returns [`ContractError`] if a built-in definition is rejected.
pub fn builtin_registry() -> Result<ContractRegistry, ContractError> {
    Ok(builtin_registry_builder()?.build())
}

fn versioned(name: &str, agent_type: AgentType) -> ContractBuilder {
    Contract::builder(name, agent_type, BUILTIN_CONTRACT_VERSION).supported_versions([
        V1_0,
        V1_1,
        BUILTIN_CONTRACT_VERSION,
    ])
}

fn strings() -> Schema {
    Schema::array_of(Schema::non_empty_string())
}

fn quality_gate() -> Schema {
    Schema::strict_object(vec![
        Property::required("name", Schema::non_empty_string()),
        Property::required("passed", Schema::Boolean),
        Property::optional("blocking", Schema::Boolean),
    ])
}

fn output(mut properties: Vec<Property>) -> Schema {
    properties.push(Property::optional("summary", Schema::string()));
    properties.push(Property::optional("quality_gates", Schema::array_of(quality_gate())));
    Schema::object(properties)
}

fn scaffold_contract() -> Contract {
    let initialize = Schema::strict_object(vec![
        Property::required("project_name", Schema::non_empty_string()),
        Property::optional("description", Schema::string()),
        Property::optional("requirements", strings()),
    ]);
    let scaffold = Schema::strict_object(vec![
        Property::required("project_name", Schema::non_empty_string()),
        Property::required("template", Schema::non_empty_string()),
        Property::required("language", Schema::non_empty_string()),
        Property::optional("framework", Schema::string()),
    ]);
    let implement = Schema::strict_object(vec![
        Property::required("project_name", Schema::non_empty_string()),
        Property::required("feature", Schema::non_empty_string()),
        Property::optional("files", strings()),
    ]);

    versioned("scaffold-agent", AgentType::Scaffold)
        .input_schema(Schema::tagged(
            "action",
            "payload",
            [
                (Action::Initialize.as_str(), initialize),
                (Action::Scaffold.as_str(), scaffold),
                (Action::Implement.as_str(), implement),
            ],
        ))
        .output_schema(output(vec![
            Property::required("project_path", Schema::non_empty_string()),
            Property::optional("files", strings()),
        ]))
        .migration(
            V1_0,
            BUILTIN_CONTRACT_VERSION,
            FieldMigration::at("/payload")
                .rename("name", "project_name")
                .rename("lang", "language"),
        )
        .migration(
            V1_1,
            BUILTIN_CONTRACT_VERSION,
            FieldMigration::at("/payload").rename("name", "project_name"),
        )
        .breaking_change(V1_1, "scaffold.lang renamed to scaffold.language")
        .breaking_change(BUILTIN_CONTRACT_VERSION, "name renamed to project_name")
        .build()
}

fn validation_contract() -> Contract {
    let validate = Schema::strict_object(vec![
        Property::required("project_path", Schema::non_empty_string()),
        Property::required("checks", strings()),
        Property::required("coverage_threshold", Schema::integer_range(0, 100)),
    ]);

    versioned("validation-agent", AgentType::Validation)
        .input_schema(Schema::tagged(
            "action",
            "payload",
            [(Action::Validate.as_str(), validate)],
        ))
        .output_schema(output(vec![
            Property::required("passed", Schema::Boolean),
            Property::optional("coverage", Schema::integer_range(0, 100)),
        ]))
        .migration(
            V1_0,
            BUILTIN_CONTRACT_VERSION,
            FieldMigration::at("/payload")
                .rename("path", "project_path")
                .default_value("coverage_threshold", json!(80)),
        )
        .migration(
            V1_1,
            BUILTIN_CONTRACT_VERSION,
            FieldMigration::at("/payload").default_value("coverage_threshold", json!(80)),
        )
        .breaking_change(V1_1, "path renamed to project_path")
        .breaking_change(BUILTIN_CONTRACT_VERSION, "coverage_threshold is required")
        .build()
}

fn e2e_contract() -> Contract {
    let run = Schema::strict_object(vec![
        Property::required("project_path", Schema::non_empty_string()),
        Property::optional("browsers", strings()),
        Property::optional("parallel", Schema::Boolean),
    ]);

    versioned("e2e-agent", AgentType::E2e)
        .input_schema(Schema::tagged(
            "action",
            "payload",
            [(Action::RunE2e.as_str(), run)],
        ))
        .output_schema(output(vec![
            Property::required("passed", Schema::Boolean),
            Property::optional("tests_run", Schema::integer_range(0, i64::MAX)),
            Property::optional("tests_failed", Schema::integer_range(0, i64::MAX)),
        ]))
        .migration(
            V1_0,
            BUILTIN_CONTRACT_VERSION,
            FieldMigration::at("/payload")
                .rename("path", "project_path")
                .remove("headless"),
        )
        .migration(
            V1_1,
            BUILTIN_CONTRACT_VERSION,
            FieldMigration::at("/payload").remove("headless"),
        )
        .breaking_change(V1_1, "path renamed to project_path")
        .breaking_change(BUILTIN_CONTRACT_VERSION, "headless flag removed")
        .build()
}

fn integration_contract() -> Contract {
    let merge = Schema::strict_object(vec![
        Property::required("repository", Schema::non_empty_string()),
        Property::required("source_branch", Schema::non_empty_string()),
        Property::required("target_branch", Schema::non_empty_string()),
        Property::required("strategy", Schema::one_of(["merge", "squash", "rebase"])),
    ]);

    versioned("integration-agent", AgentType::Integration)
        .input_schema(Schema::tagged(
            "action",
            "payload",
            [(Action::Merge.as_str(), merge)],
        ))
        .output_schema(output(vec![
            Property::required("merged", Schema::Boolean),
            Property::optional("commit", Schema::string()),
        ]))
        .migration(
            V1_0,
            BUILTIN_CONTRACT_VERSION,
            FieldMigration::at("/payload")
                .rename("source", "source_branch")
                .rename("target", "target_branch")
                .default_value("strategy", json!("merge")),
        )
        .migration(
            V1_1,
            BUILTIN_CONTRACT_VERSION,
            FieldMigration::at("/payload").default_value("strategy", json!("merge")),
        )
        .breaking_change(V1_1, "source and target renamed to *_branch")
        .breaking_change(BUILTIN_CONTRACT_VERSION, "strategy is required")
        .build()
}

fn deployment_contract() -> Contract {
    let deploy = Schema::strict_object(vec![
        Property::required("image", Schema::non_empty_string()),
        Property::required("environment", Schema::non_empty_string()),
        Property::required("replicas", Schema::integer_range(1, 1_000)),
    ]);

    versioned("deployment-agent", AgentType::Deployment)
        .input_schema(Schema::tagged(
            "action",
            "payload",
            [(Action::Deploy.as_str(), deploy)],
        ))
        .output_schema(output(vec![
            Property::required("environment", Schema::non_empty_string()),
            Property::optional("url", Schema::string()),
        ]))
        .migration(
            V1_0,
            BUILTIN_CONTRACT_VERSION,
            FieldMigration::at("/payload")
                .rename("env", "environment")
                .default_value("replicas", json!(1)),
        )
        .migration(
            V1_1,
            BUILTIN_CONTRACT_VERSION,
            FieldMigration::at("/payload").default_value("replicas", json!(1)),
        )
        .breaking_change(V1_1, "env renamed to environment")
        .breaking_change(BUILTIN_CONTRACT_VERSION, "replicas is required")
        .build()
}
