//! Orchestration service composing the stage table, contracts, dispatcher
//! and workflow state machine.

use super::payload::build_payload;
use super::policy::{StagePolicies, failed_blocking_gates};
use crate::bus::{EventBus, publish_json};
use crate::contract::ContractRegistry;
use crate::contract::validation::{check_result, check_task};
use crate::dispatch::{AgentDispatcher, DispatchError, DispatchOutcome};
use crate::envelope::{
    AgentError, ErrorCode, PlatformId, ResultEnvelope, ResultStatus, TaskEnvelope,
    WORKFLOW_EVENTS_CHANNEL, WorkflowId,
};
use crate::stage::{Stage, StageError, StageTable, WorkflowType};
use crate::workflow::{
    domain::{
        FailureInfo, Workflow, WorkflowDomainError, WorkflowDraft, WorkflowEvent,
        WorkflowEventType, WorkflowStatus,
    },
    ports::{WorkflowEventLog, WorkflowFilter, WorkflowRepository, WorkflowRepositoryError},
};
use dashmap::DashMap;
use mockable::Clock;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

/// Request payload for creating a workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateWorkflowRequest {
    workflow_type: WorkflowType,
    name: String,
    params: Value,
    platform_id: Option<PlatformId>,
}

impl CreateWorkflowRequest {
    /// Creates a request with empty parameters.
    #[must_use]
    pub fn new(workflow_type: WorkflowType, name: impl Into<String>) -> Self {
        Self {
            workflow_type,
            name: name.into(),
            params: Value::Null,
            platform_id: None,
        }
    }

    /// Sets the parameters object.
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Scopes contract resolution to a platform.
    #[must_use]
    pub fn with_platform(mut self, platform_id: PlatformId) -> Self {
        self.platform_id = Some(platform_id);
        self
    }

    fn into_draft(self) -> WorkflowDraft {
        WorkflowDraft {
            workflow_type: self.workflow_type,
            name: self.name,
            params: self.params,
            platform_id: self.platform_id,
        }
    }
}

/// Static configuration shared by every workflow.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Arc<StageTable>,
    contracts: Arc<ContractRegistry>,
    policies: StagePolicies,
}

impl Pipeline {
    /// Creates a pipeline with default stage policies.
    #[must_use]
    pub fn new(stages: Arc<StageTable>, contracts: Arc<ContractRegistry>) -> Self {
        Self {
            stages,
            contracts,
            policies: StagePolicies::default(),
        }
    }

    /// Replaces the stage policies.
    #[must_use]
    pub fn with_policies(mut self, policies: StagePolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Returns the stage table.
    #[must_use]
    pub fn stages(&self) -> &StageTable {
        &self.stages
    }

    /// Returns the contract registry.
    #[must_use]
    pub fn contracts(&self) -> &ContractRegistry {
        &self.contracts
    }

    /// Returns the stage policies.
    #[must_use]
    pub const fn policies(&self) -> &StagePolicies {
        &self.policies
    }
}

/// Service-level errors for orchestration operations.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The workflow does not exist.
    #[error("workflow not found: {0}")]
    NotFound(WorkflowId),
    /// The state machine rejected the request.
    #[error(transparent)]
    Domain(#[from] WorkflowDomainError),
    /// Persistence failed.
    #[error(transparent)]
    Repository(#[from] WorkflowRepositoryError),
    /// The dispatcher rejected a task.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// The stage table is inconsistent.
    #[error(transparent)]
    Stage(#[from] StageError),
}

/// Result type for orchestration service operations.
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

/// Drives workflows from creation to a terminal state.
///
/// Mutations of one workflow are serialised by a per-workflow lock;
/// different workflows proceed concurrently.
pub struct OrchestrationService<R, L, B, C>
where
    R: WorkflowRepository + 'static,
    L: WorkflowEventLog + 'static,
    B: EventBus + ?Sized + 'static,
    C: Clock + Send + Sync + 'static,
{
    repository: Arc<R>,
    events: Arc<L>,
    dispatcher: AgentDispatcher<B>,
    pipeline: Arc<Pipeline>,
    clock: Arc<C>,
    locks: Arc<DashMap<WorkflowId, Arc<Mutex<()>>>>,
}

impl<R, L, B, C> Clone for OrchestrationService<R, L, B, C>
where
    R: WorkflowRepository + 'static,
    L: WorkflowEventLog + 'static,
    B: EventBus + ?Sized + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            events: Arc::clone(&self.events),
            dispatcher: self.dispatcher.clone(),
            pipeline: Arc::clone(&self.pipeline),
            clock: Arc::clone(&self.clock),
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<R, L, B, C> OrchestrationService<R, L, B, C>
where
    R: WorkflowRepository + 'static,
    L: WorkflowEventLog + 'static,
    B: EventBus + ?Sized + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a new orchestration service.
    #[must_use]
    pub fn new(
        repository: Arc<R>,
        events: Arc<L>,
        dispatcher: AgentDispatcher<B>,
        pipeline: Pipeline,
        clock: Arc<C>,
    ) -> Self {
        Self {
            repository,
            events,
            dispatcher,
            pipeline: Arc::new(pipeline),
            clock,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Returns the dispatcher used for agent tasks.
    #[must_use]
    pub const fn dispatcher(&self) -> &AgentDispatcher<B> {
        &self.dispatcher
    }

    /// Creates a workflow, starts it and dispatches its first stage.
    ///
    /// A first stage whose task cannot be built or published fails the
    /// workflow; the failed workflow is returned.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError`] when the request is invalid or
    /// persistence fails.
    pub async fn create_workflow(
        &self,
        request: CreateWorkflowRequest,
    ) -> OrchestrationResult<Workflow> {
        let mut workflow =
            Workflow::new(request.into_draft(), self.pipeline.stages(), &*self.clock)?;
        let lock = self.lock_for(workflow.id());
        let _guard = lock.lock().await;

        self.repository.store(&workflow).await?;
        let mut events = vec![workflow.event(
            WorkflowEventType::Created,
            json!({
                "workflow_type": workflow.workflow_type(),
                "name": workflow.name(),
                "total_stages": workflow.total_stages(),
            }),
            &*self.clock,
        )];
        events.push(workflow.start(&*self.clock)?);
        info!(
            workflow_id = %workflow.id(),
            workflow_type = %workflow.workflow_type(),
            stage = %workflow.current_stage(),
            "workflow started"
        );
        self.dispatch_current(&mut workflow, &mut events).await?;
        self.commit(&workflow, &events).await?;
        Ok(workflow)
    }

    /// Applies a settled task to its workflow.
    ///
    /// Outcomes for workflows that are no longer running, or for a stage
    /// other than the current one, are recorded and discarded.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError`] when the workflow is unknown or
    /// persistence fails.
    pub async fn handle_outcome(&self, outcome: DispatchOutcome) -> OrchestrationResult<Workflow> {
        let workflow_id = outcome.workflow_id();
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;
        let mut workflow = self.load(workflow_id).await?;
        let mut events = Vec::new();

        if !workflow.is_running() || workflow.current_stage() != outcome.stage() {
            warn!(
                %workflow_id,
                task_id = %outcome.task().task_id,
                stage = %outcome.stage(),
                state = %workflow.state_label(),
                "discarding outcome for inactive workflow or stage"
            );
            events.push(workflow.event(
                WorkflowEventType::OutcomeDiscarded,
                json!({
                    "task_id": outcome.task().task_id,
                    "stage": outcome.stage(),
                    "state": workflow.state_label(),
                }),
                &*self.clock,
            ));
            self.commit(&workflow, &events).await?;
            return Ok(workflow);
        }

        match outcome {
            DispatchOutcome::RetryExhausted { task, error, .. } => {
                events.push(workflow.event(
                    WorkflowEventType::TaskTimedOut,
                    json!({
                        "task_id": task.task_id,
                        "attempts": task.retry_count.saturating_add(1),
                    }),
                    &*self.clock,
                ));
                self.fail(&mut workflow, FailureInfo::new(error.code, error.message), &mut events)?;
            }
            DispatchOutcome::Result {
                stage,
                task,
                result,
            } => {
                self.apply_result(&mut workflow, stage, &task, result, &mut events)
                    .await?;
            }
        }

        self.commit(&workflow, &events).await?;
        Ok(workflow)
    }

    /// Consumes dispatcher outcomes until the channel closes.
    ///
    /// Each outcome is applied on its own task so that workflows only
    /// contend on their own lock.
    pub async fn run(&self, mut outcomes: mpsc::UnboundedReceiver<DispatchOutcome>) {
        while let Some(outcome) = outcomes.recv().await {
            let service = self.clone();
            tokio::spawn(async move {
                let workflow_id = outcome.workflow_id();
                if let Err(err) = service.handle_outcome(outcome).await {
                    error!(%workflow_id, error = %err, "failed to apply dispatch outcome");
                }
            });
        }
        info!("dispatch outcome channel closed");
    }

    /// Suspends a workflow and drops its in-flight task.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::Domain`] unless the workflow is
    /// initiated or running.
    pub async fn pause(&self, workflow_id: WorkflowId) -> OrchestrationResult<Workflow> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;
        let mut workflow = self.load(workflow_id).await?;
        let event = workflow.pause(&*self.clock)?;
        let dropped = self.dispatcher.cancel_workflow(workflow_id);
        info!(%workflow_id, stage = %workflow.current_stage(), dropped, "workflow paused");
        self.commit(&workflow, &[event]).await?;
        Ok(workflow)
    }

    /// Resumes a paused workflow by dispatching its current stage again.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::Domain`] unless the workflow is paused.
    pub async fn resume(&self, workflow_id: WorkflowId) -> OrchestrationResult<Workflow> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;
        let mut workflow = self.load(workflow_id).await?;
        let mut events = vec![workflow.resume(&*self.clock)?];
        info!(%workflow_id, stage = %workflow.current_stage(), "workflow resumed");
        self.dispatch_current(&mut workflow, &mut events).await?;
        self.commit(&workflow, &events).await?;
        Ok(workflow)
    }

    /// Cancels a workflow and drops its in-flight task.
    ///
    /// Cancelling a cancelled workflow returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::Domain`] when the workflow already
    /// completed or failed.
    pub async fn cancel(&self, workflow_id: WorkflowId) -> OrchestrationResult<Workflow> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;
        let mut workflow = self.load(workflow_id).await?;
        if workflow.status() == WorkflowStatus::Cancelled {
            debug!(%workflow_id, "workflow already cancelled");
            return Ok(workflow);
        }
        let event = workflow.cancel(&*self.clock)?;
        let dropped = self.dispatcher.cancel_workflow(workflow_id);
        info!(%workflow_id, stage = %workflow.current_stage(), dropped, "workflow cancelled");
        self.commit(&workflow, &[event]).await?;
        Ok(workflow)
    }

    /// Returns the workflow with `workflow_id`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::NotFound`] for unknown workflows.
    pub async fn get_workflow(&self, workflow_id: WorkflowId) -> OrchestrationResult<Workflow> {
        self.repository
            .find_by_id(workflow_id)
            .await?
            .ok_or(OrchestrationError::NotFound(workflow_id))
    }

    /// Lists workflows matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::Repository`] when the lookup fails.
    pub async fn list_workflows(
        &self,
        filter: &WorkflowFilter,
    ) -> OrchestrationResult<Vec<Workflow>> {
        Ok(self.repository.list(filter).await?)
    }

    /// Returns the audit trail of a workflow, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::Repository`] when the lookup fails.
    pub async fn events_for(
        &self,
        workflow_id: WorkflowId,
    ) -> OrchestrationResult<Vec<WorkflowEvent>> {
        Ok(self.events.events_for(workflow_id).await?)
    }

    async fn apply_result(
        &self,
        workflow: &mut Workflow,
        stage: Stage,
        task: &TaskEnvelope,
        result: ResultEnvelope,
        events: &mut Vec<WorkflowEvent>,
    ) -> OrchestrationResult<()> {
        events.push(workflow.event(
            WorkflowEventType::ResultReceived,
            json!({
                "task_id": task.task_id,
                "status": result.status,
                "attempt": task.retry_count,
                "duration_ms": result.metrics.duration_ms,
            }),
            &*self.clock,
        ));

        let routed = self.pipeline.stages().route(&stage).map(|route| route.agent_type);
        let misrouted = routed.is_some_and(|kind| kind != result.agent_type);
        if result.agent_type != task.agent_type || misrouted {
            let failure = FailureInfo::new(
                ErrorCode::WrongAgentType,
                format!(
                    "stage '{stage}' is served by '{}' but '{}' answered",
                    task.agent_type, result.agent_type
                ),
            );
            return self.fail(workflow, failure, events);
        }

        if result.status == ResultStatus::Failure {
            let agent_error = result.error.clone().unwrap_or_else(|| {
                AgentError::new(
                    ErrorCode::ExecutionFailed,
                    "agent reported a failure without detail",
                    false,
                )
            });
            if agent_error.allows_retry() && task.has_attempts_left() {
                let retry = task.next_attempt();
                warn!(
                    workflow_id = %workflow.id(),
                    task_id = %retry.task_id,
                    %stage,
                    attempt = retry.retry_count,
                    error = %agent_error,
                    "recoverable agent failure, retrying"
                );
                return self
                    .send_task(workflow, retry, stage, WorkflowEventType::TaskRetried, events)
                    .await;
            }
            let mut failure = FailureInfo::new(agent_error.code, agent_error.message);
            if !result.output.is_null() {
                failure = failure.with_diagnostics(result.output);
            }
            return self.fail(workflow, failure, events);
        }

        let Some(contract) = self
            .pipeline
            .contracts()
            .resolve(result.agent_type, workflow.platform_id())
        else {
            let failure = FailureInfo::new(
                ErrorCode::EnvelopeValidationError,
                format!("no contract registered for agent type '{}'", result.agent_type),
            );
            return self.fail(workflow, failure, events);
        };
        let report = check_result(&contract, &result);
        if !report.valid {
            let failure = FailureInfo::new(
                ErrorCode::EnvelopeValidationError,
                format!("result violates {}: {}", contract.name(), report.summary()),
            )
            .with_diagnostics(json!({ "errors": report.errors, "output": result.output }));
            return self.fail(workflow, failure, events);
        }

        if result.status == ResultStatus::Partial
            && !self
                .pipeline
                .policies()
                .partial_policy(&stage)
                .permits_advance(&result.output)
        {
            let gates = failed_blocking_gates(&result.output);
            let message = if gates.is_empty() {
                String::from("partial result does not meet the stage completion criteria")
            } else {
                format!("blocking quality gates failed: {}", gates.join(", "))
            };
            let failure = FailureInfo::new(ErrorCode::PartialSuccess, message)
                .with_diagnostics(result.output);
            return self.fail(workflow, failure, events);
        }

        events.push(workflow.advance(&stage, self.pipeline.stages(), &*self.clock)?);
        if workflow.is_running() {
            info!(
                workflow_id = %workflow.id(),
                from = %stage,
                to = %workflow.current_stage(),
                progress = workflow.progress_percentage(),
                "stage advanced"
            );
            self.dispatch_current(workflow, events).await
        } else {
            info!(workflow_id = %workflow.id(), "workflow completed");
            Ok(())
        }
    }

    async fn dispatch_current(
        &self,
        workflow: &mut Workflow,
        events: &mut Vec<WorkflowEvent>,
    ) -> OrchestrationResult<()> {
        let stage = workflow.current_stage().clone();
        match self.build_task(workflow, &stage) {
            Ok(task) => {
                self.send_task(workflow, task, stage, WorkflowEventType::TaskDispatched, events)
                    .await
            }
            Err(failure) => self.fail(workflow, failure, events),
        }
    }

    fn build_task(&self, workflow: &Workflow, stage: &Stage) -> Result<TaskEnvelope, FailureInfo> {
        let invalid =
            |message: String| FailureInfo::new(ErrorCode::EnvelopeValidationError, message);

        let route = self
            .pipeline
            .stages()
            .route(stage)
            .ok_or_else(|| invalid(format!("no agent route for stage '{stage}'")))?;
        let contract = self
            .pipeline
            .contracts()
            .resolve(route.agent_type, workflow.platform_id())
            .ok_or_else(|| {
                invalid(format!(
                    "no contract registered for agent type '{}'",
                    route.agent_type
                ))
            })?;
        let payload =
            build_payload(route.action, workflow).map_err(|err| invalid(err.to_string()))?;
        let policies = self.pipeline.policies();
        let task = TaskEnvelope::builder(workflow.id(), route.agent_type, payload)
            .with_version(contract.version())
            .with_timeout_ms(policies.timeout_ms(stage))
            .with_max_retries(policies.max_retries(stage))
            .build(&*self.clock)
            .map_err(|err| invalid(err.to_string()))?;

        let report = check_task(&contract, &task);
        if !report.valid {
            return Err(invalid(format!(
                "task for stage '{stage}' violates {}: {}",
                contract.name(),
                report.summary()
            ))
            .with_diagnostics(json!({ "errors": report.errors })));
        }
        Ok(task)
    }

    async fn send_task(
        &self,
        workflow: &mut Workflow,
        task: TaskEnvelope,
        stage: Stage,
        kind: WorkflowEventType,
        events: &mut Vec<WorkflowEvent>,
    ) -> OrchestrationResult<()> {
        let payload = json!({
            "task_id": task.task_id,
            "stage": stage,
            "agent_type": task.agent_type,
            "attempt": task.retry_count,
            "version": task.version,
        });
        match self.dispatcher.dispatch(task, stage).await {
            Ok(_) => {
                events.push(workflow.event(kind, payload, &*self.clock));
                Ok(())
            }
            Err(err @ (DispatchError::Bus(_) | DispatchError::Envelope(_))) => {
                let failure =
                    FailureInfo::new(ErrorCode::FatalError, format!("dispatch failed: {err}"));
                self.fail(workflow, failure, events)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn fail(
        &self,
        workflow: &mut Workflow,
        failure: FailureInfo,
        events: &mut Vec<WorkflowEvent>,
    ) -> OrchestrationResult<()> {
        warn!(
            workflow_id = %workflow.id(),
            stage = %workflow.current_stage(),
            code = %failure.code,
            message = %failure.message,
            "workflow failed"
        );
        events.push(workflow.fail(failure, &*self.clock)?);
        Ok(())
    }

    async fn load(&self, workflow_id: WorkflowId) -> OrchestrationResult<Workflow> {
        let Some(workflow) = self.repository.find_by_id(workflow_id).await? else {
            self.locks.remove(&workflow_id);
            return Err(OrchestrationError::NotFound(workflow_id));
        };
        Ok(workflow)
    }

    async fn commit(
        &self,
        workflow: &Workflow,
        events: &[WorkflowEvent],
    ) -> OrchestrationResult<()> {
        self.repository.update(workflow).await?;
        for event in events {
            self.events.append(event).await?;
            let bus = self.dispatcher.bus();
            if let Err(err) = publish_json(bus.as_ref(), WORKFLOW_EVENTS_CHANNEL, event).await {
                warn!(
                    workflow_id = %workflow.id(),
                    event_type = %event.event_type(),
                    error = %err,
                    "failed to publish workflow event"
                );
            }
        }
        if workflow.status().is_terminal() {
            self.locks.remove(&workflow.id());
        }
        Ok(())
    }

    fn lock_for(&self, workflow_id: WorkflowId) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(workflow_id).or_default().value())
    }
}
