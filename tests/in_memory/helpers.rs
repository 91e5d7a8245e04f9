//! Shared harness for in-process orchestration tests.

use eyre::{Result, eyre};
use mockable::DefaultClock;
use serde_json::{Value, json};
use stagehand::bus::{
    BusMessage, EventBus, HandlerResult, InMemoryEventBus, SubscriptionHandle, handler_fn,
    publish_json,
};
use stagehand::contract::{ContractRegistry, builtin::builtin_registry};
use stagehand::dispatch::{AgentDispatcher, RetryPolicy};
use stagehand::envelope::{
    AgentError, AgentType, ErrorCode, RESULTS_CHANNEL, ResultEnvelope, TaskEnvelope, WorkflowId,
};
use stagehand::stage::StageTable;
use stagehand::workflow::{
    adapters::memory::{InMemoryWorkflowEventLog, InMemoryWorkflowRepository},
    domain::Workflow,
    services::{OrchestrationService, Pipeline, StagePolicies},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

/// Orchestrator type wired by [`Stack::start`].
pub type Orchestrator = OrchestrationService<
    InMemoryWorkflowRepository,
    InMemoryWorkflowEventLog,
    InMemoryEventBus,
    DefaultClock,
>;

/// How a simulated agent answers its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Answers every task with valid output.
    Succeed,
    /// Answers with valid output after a delay.
    SucceedAfter(Duration),
    /// Never answers.
    Silent,
    /// Answers with an unrecoverable failure.
    FailFatal,
}

/// Orchestrator, dispatcher listener and bus running in-process.
pub struct Stack {
    /// Shared bus.
    pub bus: Arc<InMemoryEventBus>,
    /// Orchestration service under test.
    pub service: Orchestrator,
    runner: JoinHandle<()>,
}

impl Stack {
    /// Starts a stack with built-in contracts and the given policies.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in tables are rejected or the
    /// dispatcher cannot subscribe.
    pub async fn start(policies: StagePolicies) -> Result<Self> {
        Self::with_contracts(policies, builtin_registry()?).await
    }

    /// Starts a stack with a custom contract registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage table is rejected or the dispatcher
    /// cannot subscribe.
    pub async fn with_contracts(
        policies: StagePolicies,
        contracts: ContractRegistry,
    ) -> Result<Self> {
        let bus = Arc::new(InMemoryEventBus::new(256));
        let (dispatcher, outcomes) =
            AgentDispatcher::new(Arc::clone(&bus), RetryPolicy::immediate());
        dispatcher.listen().await?;
        let pipeline = Pipeline::new(Arc::new(StageTable::builtin()?), Arc::new(contracts))
            .with_policies(policies);
        let service = OrchestrationService::new(
            Arc::new(InMemoryWorkflowRepository::new()),
            Arc::new(InMemoryWorkflowEventLog::new()),
            dispatcher,
            pipeline,
            Arc::new(DefaultClock),
        );
        let background = service.clone();
        let runner = tokio::spawn(async move { background.run(outcomes).await });
        Ok(Self {
            bus,
            service,
            runner,
        })
    }

    /// Attaches a simulated agent for every agent type.
    ///
    /// # Errors
    ///
    /// Returns an error if a subscription fails.
    pub async fn agents(&self, behaviour: Behaviour) -> Result<Vec<SimulatedAgent>> {
        let mut agents = Vec::new();
        for agent_type in AgentType::ALL {
            agents.push(SimulatedAgent::attach(&self.bus, agent_type, behaviour).await?);
        }
        Ok(agents)
    }

    /// Polls until the workflow satisfies `done` or `limit` elapses.
    ///
    /// # Errors
    ///
    /// Returns an error on lookup failure or when the deadline passes.
    pub async fn wait_for(
        &self,
        workflow_id: WorkflowId,
        limit: Duration,
        done: impl Fn(&Workflow) -> bool,
    ) -> Result<Workflow> {
        let deadline = Instant::now() + limit;
        loop {
            let workflow = self.service.get_workflow(workflow_id).await?;
            if done(&workflow) {
                return Ok(workflow);
            }
            if Instant::now() >= deadline {
                return Err(eyre!(
                    "workflow {workflow_id} still {} after {limit:?}",
                    workflow.state_label()
                ));
            }
            sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        self.runner.abort();
        self.bus.shutdown();
    }
}

/// An agent answering tasks from one task channel.
pub struct SimulatedAgent {
    /// Agent type served.
    pub agent_type: AgentType,
    received: Arc<AtomicUsize>,
    subscription: SubscriptionHandle,
}

impl SimulatedAgent {
    /// Subscribes an agent of `agent_type` to `bus`.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription fails.
    pub async fn attach(
        bus: &Arc<InMemoryEventBus>,
        agent_type: AgentType,
        behaviour: Behaviour,
    ) -> Result<Self> {
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        let replies = Arc::clone(bus);
        let subscription = bus
            .subscribe(
                &agent_type.task_channel(),
                handler_fn(move |message: BusMessage| {
                    let seen = Arc::clone(&counter);
                    let outbound = Arc::clone(&replies);
                    async move {
                        let task = TaskEnvelope::from_value(message.payload)?;
                        seen.fetch_add(1, Ordering::SeqCst);
                        answer(&outbound, &task, behaviour).await?;
                        HandlerResult::Ok(())
                    }
                }),
            )
            .await?;
        Ok(Self {
            agent_type,
            received,
            subscription,
        })
    }

    /// Returns how many tasks were delivered.
    #[must_use]
    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }

    /// Stops answering.
    pub fn detach(self) {
        self.subscription.unsubscribe();
    }
}

async fn answer(bus: &InMemoryEventBus, task: &TaskEnvelope, behaviour: Behaviour) -> Result<()> {
    let result = match behaviour {
        Behaviour::Silent => return Ok(()),
        Behaviour::Succeed => {
            ResultEnvelope::success(task, output_for(task.agent_type), &DefaultClock)
        }
        Behaviour::SucceedAfter(delay) => {
            sleep(delay).await;
            ResultEnvelope::success(task, output_for(task.agent_type), &DefaultClock)
        }
        Behaviour::FailFatal => ResultEnvelope::failure(
            task,
            AgentError::new(ErrorCode::FatalError, "simulated crash", false),
            &DefaultClock,
        ),
    };
    publish_json(bus, RESULTS_CHANNEL, &result).await?;
    Ok(())
}

/// Returns output satisfying the built-in contract of `agent_type`.
#[must_use]
pub fn output_for(agent_type: AgentType) -> Value {
    match agent_type {
        AgentType::Scaffold => json!({ "project_path": "./shop", "files": ["package.json"] }),
        AgentType::Validation => json!({ "passed": true, "coverage": 91 }),
        AgentType::E2e => json!({ "passed": true, "tests_run": 12, "tests_failed": 0 }),
        AgentType::Integration => json!({ "merged": true }),
        AgentType::Deployment => json!({ "environment": "staging", "url": "https://shop.test" }),
    }
}
