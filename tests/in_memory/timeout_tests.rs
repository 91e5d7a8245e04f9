//! Silent agents exhaust their attempt budget.

use super::helpers::{Behaviour, SimulatedAgent, Stack};
use eyre::{Result, ensure, eyre};
use rstest::rstest;
use stagehand::envelope::{AgentType, ErrorCode};
use stagehand::stage::{Stage, WorkflowType, names};
use stagehand::workflow::{
    domain::{WorkflowEventType, WorkflowStatus},
    services::{CreateWorkflowRequest, StagePolicies, StagePolicy},
};
use std::time::Duration;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn silent_agent_is_retried_then_the_workflow_times_out() -> Result<()> {
    let stack = Stack::start(StagePolicies::new(60, 2)).await?;
    let silent = SimulatedAgent::attach(&stack.bus, AgentType::Scaffold, Behaviour::Silent).await?;

    let created = stack
        .service
        .create_workflow(CreateWorkflowRequest::new(WorkflowType::Bugfix, "shop"))
        .await?;
    let failed = stack
        .wait_for(created.id(), Duration::from_secs(5), |workflow| {
            !workflow.is_running()
        })
        .await?;

    ensure!(failed.status() == WorkflowStatus::Failed);
    let failure = failed.failure().ok_or_else(|| eyre!("missing failure"))?;
    ensure!(failure.code == ErrorCode::Timeout);
    ensure!(silent.received() == 2, "expected one retry, saw {}", silent.received());
    let events = stack.service.events_for(created.id()).await?;
    let kinds: Vec<_> = events.iter().map(|event| event.event_type()).collect();
    ensure!(kinds.contains(&WorkflowEventType::TaskTimedOut));
    ensure!(kinds.last() == Some(&WorkflowEventType::Failed));
    ensure!(stack.service.dispatcher().pending().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stage_override_gives_a_slow_stage_more_time() -> Result<()> {
    let slow_stage = Stage::new(names::INITIALIZATION)?;
    let policies = StagePolicies::new(40, 1)
        .with_stage(slow_stage, StagePolicy::new().with_timeout_ms(2_000));
    let stack = Stack::start(policies).await?;
    SimulatedAgent::attach(
        &stack.bus,
        AgentType::Scaffold,
        Behaviour::SucceedAfter(Duration::from_millis(120)),
    )
    .await?;
    let validation =
        SimulatedAgent::attach(&stack.bus, AgentType::Validation, Behaviour::Silent).await?;

    let created = stack
        .service
        .create_workflow(CreateWorkflowRequest::new(WorkflowType::Bugfix, "shop"))
        .await?;
    let failed = stack
        .wait_for(created.id(), Duration::from_secs(5), |workflow| {
            !workflow.is_running()
        })
        .await?;

    ensure!(failed.current_stage().as_str() == names::VALIDATION);
    ensure!(failed.failure().map(|failure| failure.code) == Some(ErrorCode::Timeout));
    ensure!(validation.received() == 1);
    Ok(())
}
