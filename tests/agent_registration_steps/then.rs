//! Then steps for agent registration BDD scenarios.

use super::world::{RegistrationWorld, agent_type, platform, run_async};
use eyre::{WrapErr, eyre};
use rstest_bdd_macros::then;
use stagehand::agent::{domain::AgentRegistration, services::AgentRegistryError};
use stagehand::envelope::ErrorCode;
use std::time::Duration;

const STALE_AFTER: Duration = Duration::from_secs(30);

fn last_result(
    world: &RegistrationWorld,
) -> Result<&Result<AgentRegistration, AgentRegistryError>, eyre::Report> {
    world
        .last_result
        .as_ref()
        .ok_or_else(|| eyre!("missing registration result in scenario world"))
}

#[then("registration succeeds")]
fn registration_succeeds(world: &RegistrationWorld) -> Result<(), eyre::Report> {
    match last_result(world)? {
        Ok(_) => Ok(()),
        Err(err) => Err(eyre!("expected registration to succeed, got {err}")),
    }
}

#[then("registration fails with a conflict")]
fn registration_conflicts(world: &RegistrationWorld) -> Result<(), eyre::Report> {
    match last_result(world)? {
        Err(err @ AgentRegistryError::Conflict { .. })
            if err.code() == Some(ErrorCode::Conflict) =>
        {
            Ok(())
        }
        other => Err(eyre!("expected a conflict, got {other:?}")),
    }
}

#[then("registration fails with an unsupported version error")]
fn registration_rejects_version(world: &RegistrationWorld) -> Result<(), eyre::Report> {
    match last_result(world)? {
        Err(AgentRegistryError::UnsupportedContractVersion { .. }) => Ok(()),
        other => Err(eyre!("expected an unsupported version error, got {other:?}")),
    }
}

#[then(r#"resolving "{kind}" returns the registered agent"#)]
fn resolves_registered(world: &RegistrationWorld, kind: String) -> Result<(), eyre::Report> {
    let expected = match last_result(world)? {
        Ok(registration) => registration.id(),
        Err(err) => return Err(eyre!("registration failed: {err}")),
    };
    let resolved = run_async(world.service.resolve(agent_type(&kind)?, None))
        .wrap_err("resolve agent")?
        .ok_or_else(|| eyre!("no agent resolved for '{kind}'"))?;
    if resolved.id() != expected {
        return Err(eyre!("resolved {} instead of {expected}", resolved.id()));
    }
    Ok(())
}

#[then(r#"resolving "{kind}" for platform "{name}" returns the platform agent"#)]
fn resolves_platform_agent(
    world: &RegistrationWorld,
    kind: String,
    name: String,
) -> Result<(), eyre::Report> {
    let expected = world
        .scoped
        .last()
        .ok_or_else(|| eyre!("no platform agent in scenario world"))?;
    let platform_id = platform(&name)?;
    let resolved = run_async(world.service.resolve(agent_type(&kind)?, Some(&platform_id)))
        .wrap_err("resolve platform agent")?
        .ok_or_else(|| eyre!("no agent resolved for '{kind}' on '{name}'"))?;
    if resolved.id() != expected.id() || resolved.concurrency_limit() != 4 {
        return Err(eyre!("expected the platform agent, got {}", resolved.id()));
    }
    Ok(())
}

#[then(r#"resolving "{kind}" for platform "{name}" returns the global agent"#)]
fn resolves_global_agent(
    world: &RegistrationWorld,
    kind: String,
    name: String,
) -> Result<(), eyre::Report> {
    let expected = world
        .global
        .last()
        .ok_or_else(|| eyre!("no global agent in scenario world"))?;
    let platform_id = platform(&name)?;
    let resolved = run_async(world.service.resolve(agent_type(&kind)?, Some(&platform_id)))
        .wrap_err("resolve global agent")?
        .ok_or_else(|| eyre!("no agent resolved for '{kind}' on '{name}'"))?;
    if resolved.id() != expected.id() || resolved.platform_id().is_some() {
        return Err(eyre!("expected the global agent, got {}", resolved.id()));
    }
    Ok(())
}

#[then("the health report counts {count:usize} stale agents")]
fn stale_agents(world: &RegistrationWorld, count: usize) -> Result<(), eyre::Report> {
    let report = run_async(world.service.health_report(world.now, STALE_AFTER))
        .wrap_err("build health report")?;
    let stale = report.stale().count();
    if stale != count {
        return Err(eyre!("expected {count} stale agents, found {stale}"));
    }
    Ok(())
}
