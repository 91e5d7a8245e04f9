//! Unit tests for the schema and contract registries.

use crate::contract::builtin::{BUILTIN_CONTRACT_VERSION, builtin_registry, contract_for};
use crate::contract::domain::{
    Contract, ContractError, Schema, SchemaRegistryError, SemVer,
};
use crate::contract::registry::{ContractRegistry, SchemaRegistry};
use crate::envelope::{AgentType, ErrorCode, PlatformId};
use eyre::{Result, ensure};
use rstest::rstest;

fn v(raw: &str) -> SemVer {
    SemVer::parse(raw).expect("valid version")
}

#[rstest]
fn schema_registry_registration_is_idempotent_for_same_version() -> Result<()> {
    let mut builder = SchemaRegistry::builder();
    builder.register("deploy.input", Schema::Any, v("1.0.0"))?;
    builder.register("deploy.input", Schema::Boolean, v("1.0.0"))?;
    let registry = builder.build();

    ensure!(registry.has("deploy.input"));
    ensure!(registry.list() == vec!["deploy.input"]);
    let entry = registry
        .describe("deploy.input")
        .ok_or_else(|| eyre::eyre!("entry missing"))?;
    ensure!(entry.version() == v("1.0.0"));
    ensure!(entry.schema() == &Schema::Any, "first registration wins");
    Ok(())
}

#[rstest]
fn schema_registry_rejects_conflicting_version() {
    let mut builder = SchemaRegistry::builder();
    builder
        .register("deploy.input", Schema::Any, v("1.0.0"))
        .expect("first registration");

    let result = builder.register("deploy.input", Schema::Any, v("1.1.0"));

    assert!(matches!(
        result,
        Err(SchemaRegistryError::VersionConflict { existing, requested, .. })
            if existing == v("1.0.0") && requested == v("1.1.0")
    ));
}

#[rstest]
fn schema_registry_rejects_blank_name() {
    let mut builder = SchemaRegistry::builder();
    assert!(matches!(
        builder.register(" ", Schema::Any, v("1.0.0")),
        Err(SchemaRegistryError::InvalidName(_))
    ));
}

#[rstest]
fn unknown_schema_is_not_described() {
    let registry = SchemaRegistry::builder().build();
    assert!(!registry.has("missing"));
    assert!(registry.describe("missing").is_none());
}

#[rstest]
fn builtin_registry_covers_every_agent_type() -> Result<()> {
    let registry = builtin_registry()?;

    ensure!(registry.len() == AgentType::ALL.len());
    for agent_type in AgentType::ALL {
        let contract = registry
            .resolve(agent_type, None)
            .ok_or_else(|| eyre::eyre!("no contract for {agent_type}"))?;
        ensure!(contract.version() == BUILTIN_CONTRACT_VERSION);
        ensure!(registry.schemas().has(&format!("{}.input", contract.name())));
        ensure!(registry.schemas().has(&format!("{}.output", contract.name())));
    }
    Ok(())
}

#[rstest]
fn duplicate_platform_contract_raises_conflict() -> Result<()> {
    let platform = PlatformId::new("acme")?;
    let mut builder = ContractRegistry::builder();
    builder.register(contract_for(AgentType::Deployment), Some(platform.clone()))?;

    let result = builder.register(contract_for(AgentType::Deployment), Some(platform.clone()));

    let Err(error) = result else {
        eyre::bail!("second registration should conflict");
    };
    ensure!(
        error
            == ContractError::Conflict {
                agent_type: AgentType::Deployment,
                platform: Some(platform),
            }
    );
    ensure!(error.code() == ErrorCode::Conflict);
    ensure!(error.to_string().starts_with("CONFLICT"));
    Ok(())
}

#[rstest]
fn global_and_platform_contracts_coexist() -> Result<()> {
    let platform = PlatformId::new("acme")?;
    let mut builder = ContractRegistry::builder();
    builder.register(contract_for(AgentType::E2e), None)?;
    builder.register(contract_for(AgentType::E2e), Some(platform))?;
    ensure!(builder.build().len() == 2);
    Ok(())
}

#[rstest]
fn resolve_prefers_platform_override_and_falls_back_to_global() -> Result<()> {
    let acme = PlatformId::new("acme")?;
    let other = PlatformId::new("globex")?;
    let override_contract = Contract::builder("acme-deployment", AgentType::Deployment, "2.0.0")
        .input_schema(Schema::Any)
        .output_schema(Schema::Any)
        .build();
    let mut builder = ContractRegistry::builder();
    builder.register(contract_for(AgentType::Deployment), None)?;
    builder.register(override_contract, Some(acme.clone()))?;
    let registry = builder.build();

    let scoped = registry
        .resolve(AgentType::Deployment, Some(&acme))
        .ok_or_else(|| eyre::eyre!("scoped contract missing"))?;
    ensure!(scoped.name() == "acme-deployment");

    let fallback = registry
        .resolve(AgentType::Deployment, Some(&other))
        .ok_or_else(|| eyre::eyre!("global contract missing"))?;
    ensure!(fallback.name() == "deployment-agent");

    ensure!(registry.resolve(AgentType::Scaffold, None).is_none());
    ensure!(!registry.covers(AgentType::Scaffold));
    Ok(())
}

#[rstest]
fn platform_override_may_reuse_the_global_name_at_a_new_version() -> Result<()> {
    let acme = PlatformId::new("acme")?;
    let builtin = contract_for(AgentType::Deployment);
    let input = builtin
        .input_schema()
        .cloned()
        .ok_or_else(|| eyre::eyre!("built-in input schema missing"))?;
    let output = builtin
        .output_schema()
        .cloned()
        .ok_or_else(|| eyre::eyre!("built-in output schema missing"))?;
    let override_contract = Contract::builder("deployment-agent", AgentType::Deployment, "2.0.0")
        .input_schema(input)
        .output_schema(output)
        .build();

    let mut builder = ContractRegistry::builder();
    builder.register(builtin, None)?;
    builder.register(override_contract, Some(acme.clone()))?;
    let registry = builder.build();

    let scoped = registry
        .resolve(AgentType::Deployment, Some(&acme))
        .ok_or_else(|| eyre::eyre!("scoped contract missing"))?;
    ensure!(scoped.version() == "2.0.0");
    let global = registry
        .resolve(AgentType::Deployment, None)
        .ok_or_else(|| eyre::eyre!("global contract missing"))?;
    ensure!(global.version() == BUILTIN_CONTRACT_VERSION);

    for (name, expected) in [
        ("deployment-agent.input", v(BUILTIN_CONTRACT_VERSION)),
        ("deployment-agent.output", v(BUILTIN_CONTRACT_VERSION)),
        ("deployment-agent@acme.input", v("2.0.0")),
        ("deployment-agent@acme.output", v("2.0.0")),
    ] {
        let entry = registry
            .schemas()
            .describe(name)
            .ok_or_else(|| eyre::eyre!("schema {name} missing"))?;
        ensure!(entry.version() == expected, "{name} at wrong version");
    }
    Ok(())
}

#[rstest]
fn invalid_definition_is_refused_at_registration() {
    let contract = Contract::builder("deploy", AgentType::Deployment, "1.1.0")
        .supported_versions(["1.0.0", "1.1.0"])
        .input_schema(Schema::Any)
        .output_schema(Schema::Any)
        .build();

    let result = ContractRegistry::builder().register(contract, None).map(|_| ());

    assert!(matches!(
        result,
        Err(ContractError::InvalidDefinition { ref name, .. }) if name == "deploy"
    ));
}
