//! When steps for agent registration BDD scenarios.

use super::world::{RegistrationWorld, run_async};
use chrono::Duration;
use eyre::{WrapErr, eyre};
use rstest_bdd_macros::when;
use stagehand::agent::domain::AgentHeartbeat;

#[when("the agent registers")]
fn the_agent_registers(world: &mut RegistrationWorld) -> Result<(), eyre::Report> {
    let request = world
        .pending
        .take()
        .ok_or_else(|| eyre!("no pending registration in scenario world"))?;
    world.last_result = Some(run_async(world.service.register(request)));
    Ok(())
}

#[when("{seconds:u32} seconds pass without a heartbeat")]
fn seconds_pass(world: &mut RegistrationWorld, seconds: u32) {
    world.now += Duration::seconds(i64::from(seconds));
}

#[when("the agent sends a heartbeat with {in_flight:u32} tasks in flight")]
fn the_agent_beats(world: &mut RegistrationWorld, in_flight: u32) -> Result<(), eyre::Report> {
    let agent = world
        .global
        .last()
        .ok_or_else(|| eyre!("no registered agent in scenario world"))?;
    let heartbeat = AgentHeartbeat::new(agent.id(), agent.agent_type()).with_in_flight(in_flight);
    let updated =
        run_async(world.service.record_heartbeat(&heartbeat)).wrap_err("record heartbeat")?;
    if updated.in_flight() != in_flight {
        return Err(eyre!(
            "expected {in_flight} tasks in flight, found {}",
            updated.in_flight()
        ));
    }
    world.now = updated.last_heartbeat_at();
    Ok(())
}
