//! Given steps for agent registration BDD scenarios.

use super::world::{RegistrationWorld, agent_type, platform, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::given;
use stagehand::agent::services::RegisterAgentRequest;
use stagehand::contract::builtin::BUILTIN_CONTRACT_VERSION;

#[given(r#"a "{kind}" agent speaking contract version "{version}""#)]
fn an_agent_speaking(
    world: &mut RegistrationWorld,
    kind: String,
    version: String,
) -> Result<(), eyre::Report> {
    world.pending = Some(RegisterAgentRequest::new(agent_type(&kind)?, version));
    Ok(())
}

#[given(r#"a registered "{kind}" agent"#)]
fn a_registered_agent(world: &mut RegistrationWorld, kind: String) -> Result<(), eyre::Report> {
    let request = RegisterAgentRequest::new(agent_type(&kind)?, BUILTIN_CONTRACT_VERSION);
    let registered =
        run_async(world.service.register(request)).wrap_err("register global agent")?;
    world.global.push(registered);
    Ok(())
}

#[given(r#"a registered "{kind}" agent for platform "{name}""#)]
fn a_registered_platform_agent(
    world: &mut RegistrationWorld,
    kind: String,
    name: String,
) -> Result<(), eyre::Report> {
    let request = RegisterAgentRequest::new(agent_type(&kind)?, BUILTIN_CONTRACT_VERSION)
        .with_platform(platform(&name)?)
        .with_concurrency_limit(4);
    let registered =
        run_async(world.service.register(request)).wrap_err("register platform agent")?;
    world.scoped.push(registered);
    Ok(())
}
