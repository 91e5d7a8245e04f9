//! Full workflow runs against simulated agents.

use super::helpers::{Behaviour, SimulatedAgent, Stack};
use eyre::{Result, ensure, eyre};
use rstest::rstest;
use stagehand::contract::{
    Contract,
    builtin::{builtin_registry_builder, contract_for},
};
use stagehand::envelope::{AgentType, ErrorCode, PlatformId};
use stagehand::stage::WorkflowType;
use stagehand::workflow::{
    domain::{WorkflowEvent, WorkflowEventType, WorkflowStatus},
    services::{CreateWorkflowRequest, StagePolicies},
};
use std::time::Duration;

const LIMIT: Duration = Duration::from_secs(5);

#[rstest]
#[case(WorkflowType::Bugfix, 3)]
#[case(WorkflowType::App, 6)]
#[tokio::test(flavor = "multi_thread")]
async fn workflow_runs_to_completion_through_every_stage(
    #[case] workflow_type: WorkflowType,
    #[case] stages: usize,
) -> Result<()> {
    let stack = Stack::start(StagePolicies::default()).await?;
    let agents = stack.agents(Behaviour::Succeed).await?;

    let created = stack
        .service
        .create_workflow(CreateWorkflowRequest::new(workflow_type, "shop"))
        .await?;
    let finished = stack
        .wait_for(created.id(), LIMIT, |workflow| !workflow.is_running())
        .await?;

    ensure!(finished.status() == WorkflowStatus::Completed, "{finished:?}");
    ensure!(finished.progress_percentage() == 100);
    ensure!(finished.completed_at().is_some());
    let delivered: usize = agents.iter().map(SimulatedAgent::received).sum();
    ensure!(delivered == stages);

    let events = stack.service.events_for(created.id()).await?;
    let advanced = events
        .iter()
        .filter(|event| event.event_type() == WorkflowEventType::StageAdvanced)
        .count();
    ensure!(advanced == stages.saturating_sub(1));
    ensure!(
        events.last().map(WorkflowEvent::event_type) == Some(WorkflowEventType::Completed)
    );
    ensure!(events.windows(2).all(|pair| {
        pair.first().map(WorkflowEvent::created_at) <= pair.get(1).map(WorkflowEvent::created_at)
    }));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn fatal_agent_failure_fails_the_workflow_at_its_stage() -> Result<()> {
    let stack = Stack::start(StagePolicies::default()).await?;
    let scaffold =
        SimulatedAgent::attach(&stack.bus, AgentType::Scaffold, Behaviour::Succeed).await?;
    let validation =
        SimulatedAgent::attach(&stack.bus, AgentType::Validation, Behaviour::FailFatal).await?;

    let created = stack
        .service
        .create_workflow(CreateWorkflowRequest::new(WorkflowType::Bugfix, "shop"))
        .await?;
    let failed = stack
        .wait_for(created.id(), LIMIT, |workflow| !workflow.is_running())
        .await?;

    let failure = failed.failure().ok_or_else(|| eyre!("missing failure"))?;
    ensure!(failure.code == ErrorCode::FatalError);
    ensure!(failed.current_stage().as_str() == "validation");
    ensure!(validation.received() == 1, "fatal failures are never retried");
    ensure!(scaffold.received() == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn late_result_after_cancel_is_discarded() -> Result<()> {
    let stack = Stack::start(StagePolicies::default()).await?;
    let slow = SimulatedAgent::attach(
        &stack.bus,
        AgentType::Scaffold,
        Behaviour::SucceedAfter(Duration::from_millis(150)),
    )
    .await?;

    let created = stack
        .service
        .create_workflow(CreateWorkflowRequest::new(WorkflowType::Feature, "shop"))
        .await?;
    let cancelled = stack.service.cancel(created.id()).await?;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let stored = stack.service.get_workflow(created.id()).await?;
    ensure!(cancelled.status() == WorkflowStatus::Cancelled);
    ensure!(stored.status() == WorkflowStatus::Cancelled);
    ensure!(stored.current_stage() == cancelled.current_stage());
    ensure!(slow.received() == 1);
    ensure!(stack.service.dispatcher().pending().is_empty());
    let events = stack.service.events_for(created.id()).await?;
    ensure!(
        events.last().map(|event| event.event_type()) == Some(WorkflowEventType::Cancelled)
    );
    slow.detach();
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn platform_contract_overrides_the_global_one() -> Result<()> {
    let acme = PlatformId::new("acme")?;
    let global = contract_for(AgentType::Scaffold);
    let input = global
        .input_schema()
        .cloned()
        .ok_or_else(|| eyre!("built-in contract has an input schema"))?;
    let output = global
        .output_schema()
        .cloned()
        .ok_or_else(|| eyre!("built-in contract has an output schema"))?;
    let scoped = Contract::builder("acme-scaffold-agent", AgentType::Scaffold, "2.0.0")
        .input_schema(input)
        .output_schema(output)
        .build();
    let mut contracts = builtin_registry_builder()?;
    contracts.register(scoped, Some(acme.clone()))?;
    let stack = Stack::with_contracts(StagePolicies::default(), contracts.build()).await?;
    stack.agents(Behaviour::Succeed).await?;

    let scoped_run = stack
        .service
        .create_workflow(
            CreateWorkflowRequest::new(WorkflowType::Bugfix, "shop").with_platform(acme),
        )
        .await?;
    let global_run = stack
        .service
        .create_workflow(CreateWorkflowRequest::new(WorkflowType::Bugfix, "shop"))
        .await?;

    for id in [scoped_run.id(), global_run.id()] {
        let finished = stack
            .wait_for(id, LIMIT, |workflow| !workflow.is_running())
            .await?;
        ensure!(finished.status() == WorkflowStatus::Completed, "{finished:?}");
    }
    let first_dispatch = |events: Vec<WorkflowEvent>| {
        events
            .into_iter()
            .find(|event| event.event_type() == WorkflowEventType::TaskDispatched)
            .map(|event| event.payload()["version"].clone())
    };
    ensure!(
        first_dispatch(stack.service.events_for(scoped_run.id()).await?)
            == Some(serde_json::json!("2.0.0"))
    );
    ensure!(
        first_dispatch(stack.service.events_for(global_run.id()).await?)
            == Some(serde_json::json!("1.2.0"))
    );
    Ok(())
}
