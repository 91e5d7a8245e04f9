//! Correlated request/response exchange with agents over the bus.

use super::{
    DispatchError, DispatchOutcome, DispatchResult, PendingTable, RetryPolicy, TimeoutDecision,
};
use crate::bus::{BusMessage, EventBus, HandlerResult, SubscriptionHandle, handler_fn};
use crate::envelope::{
    AgentError, RESULTS_CHANNEL, ResultEnvelope, ResultStatus, TaskEnvelope, TaskId, TaskStatus,
    WorkflowId,
};
use crate::stage::Stage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// What happened to an incoming result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultDisposition {
    /// The result settled a pending task and was forwarded.
    Forwarded,
    /// The task was unknown, already settled or cancelled.
    Discarded,
}

struct Inner<B: ?Sized> {
    bus: Arc<B>,
    pending: PendingTable,
    policy: RetryPolicy,
    outcomes: mpsc::UnboundedSender<DispatchOutcome>,
}

/// Publishes tasks, arms their timers and correlates results.
///
/// Cloning is cheap; clones share the pending table.
pub struct AgentDispatcher<B: EventBus + ?Sized + 'static> {
    inner: Arc<Inner<B>>,
}

impl<B: EventBus + ?Sized + 'static> Clone for AgentDispatcher<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: EventBus + ?Sized + 'static> AgentDispatcher<B> {
    /// Creates a dispatcher and the receiver of its settled tasks.
    #[must_use]
    pub fn new(
        bus: Arc<B>,
        policy: RetryPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<DispatchOutcome>) {
        let (outcomes, receiver) = mpsc::unbounded_channel();
        let dispatcher = Self {
            inner: Arc::new(Inner {
                bus,
                pending: PendingTable::new(),
                policy,
                outcomes,
            }),
        };
        (dispatcher, receiver)
    }

    /// Returns the bus tasks are published on.
    #[must_use]
    pub fn bus(&self) -> &Arc<B> {
        &self.inner.bus
    }

    /// Returns the pending-task table.
    #[must_use]
    pub fn pending(&self) -> &PendingTable {
        &self.inner.pending
    }

    /// Publishes `envelope` for `stage` and arms its timeout.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::AlreadyPending`] when a task is already in
    /// flight for the same workflow and stage, or an encoding or bus error.
    /// On error nothing stays reserved.
    pub async fn dispatch(
        &self,
        mut envelope: TaskEnvelope,
        stage: Stage,
    ) -> DispatchResult<TaskId> {
        envelope.status = TaskStatus::Dispatched;
        let wire = envelope.to_value()?;
        let task_id = envelope.task_id;
        let workflow_id = envelope.workflow_id;
        let channel = envelope.agent_type.task_channel();
        let retry_count = envelope.retry_count;
        let timeout_ms = envelope.timeout_ms;

        self.inner.pending.reserve(envelope, stage.clone())?;

        match self.inner.bus.publish(&channel, wire).await {
            Ok(delivered) => {
                if delivered == 0 {
                    warn!(
                        %workflow_id,
                        %task_id,
                        %stage,
                        %channel,
                        "no agent listening, relying on timeout"
                    );
                }
            }
            Err(err) => {
                self.inner.pending.claim(task_id, workflow_id);
                return Err(err.into());
            }
        }

        self.arm_timer(task_id, retry_count, timeout_ms);
        info!(%workflow_id, %task_id, %stage, %channel, "task dispatched");
        Ok(task_id)
    }

    /// Settles the pending task answered by `result` and forwards it.
    ///
    /// Unknown, duplicate and late results are discarded with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::OutcomeChannelClosed`] when the outcome
    /// receiver is gone.
    pub fn accept_result(&self, result: ResultEnvelope) -> DispatchResult<ResultDisposition> {
        let task_id = result.task_id;
        let workflow_id = result.workflow_id;
        let Some(pending) = self.inner.pending.claim(task_id, workflow_id) else {
            warn!(%workflow_id, %task_id, "discarding result for unknown or settled task");
            return Ok(ResultDisposition::Discarded);
        };

        let (mut task, stage) = pending.into_parts();
        task.status = match result.status {
            ResultStatus::Success => TaskStatus::Succeeded,
            ResultStatus::Failure | ResultStatus::Partial => TaskStatus::Failed,
        };
        debug!(
            %workflow_id,
            %task_id,
            %stage,
            status = result.status.as_str(),
            "result correlated"
        );
        self.forward(DispatchOutcome::Result {
            stage,
            task,
            result,
        })?;
        Ok(ResultDisposition::Forwarded)
    }

    /// Drops every pending task of `workflow_id` and aborts their timers.
    ///
    /// Returns how many tasks were dropped.
    pub fn cancel_workflow(&self, workflow_id: WorkflowId) -> usize {
        let dropped = self.inner.pending.drop_workflow(workflow_id);
        for pending in &dropped {
            info!(
                %workflow_id,
                task_id = %pending.envelope().task_id,
                stage = %pending.stage(),
                "pending task dropped"
            );
        }
        dropped.len()
    }

    /// Subscribes to the results channel and feeds
    /// [`AgentDispatcher::accept_result`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Bus`] when the subscription fails.
    pub async fn listen(&self) -> DispatchResult<SubscriptionHandle> {
        let dispatcher = self.clone();
        let handler = handler_fn(move |message: BusMessage| {
            let receiver = dispatcher.clone();
            async move {
                let result = ResultEnvelope::from_value(message.payload)?;
                receiver.accept_result(result)?;
                HandlerResult::Ok(())
            }
        });
        Ok(self.inner.bus.subscribe(RESULTS_CHANNEL, handler).await?)
    }

    fn forward(&self, outcome: DispatchOutcome) -> DispatchResult<()> {
        self.inner
            .outcomes
            .send(outcome)
            .map_err(|_| DispatchError::OutcomeChannelClosed)
    }

    fn arm_timer(&self, task_id: TaskId, retry_count: u32, timeout_ms: u64) {
        let dispatcher = self.clone();
        let (armed, attached) = oneshot::channel::<()>();
        // The countdown starts only once the handle is stored on the entry.
        let timer = tokio::spawn(async move {
            if attached.await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            dispatcher.handle_timeout(task_id, retry_count).await;
        });
        self.inner
            .pending
            .attach_timer(task_id, retry_count, timer.abort_handle());
        if armed.send(()).is_err() {
            debug!(%task_id, retry_count, "attempt settled before its timer was armed");
        }
    }

    async fn handle_timeout(&self, task_id: TaskId, retry_count: u32) {
        match self.inner.pending.on_timeout(task_id, retry_count) {
            TimeoutDecision::Stale => {
                debug!(%task_id, retry_count, "stale timer ignored");
            }
            TimeoutDecision::Retry(next) => {
                let delay = self.inner.policy.delay_for(next.retry_count);
                warn!(
                    workflow_id = %next.workflow_id,
                    %task_id,
                    attempt = next.retry_count,
                    max_retries = next.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "task timed out, retrying"
                );
                tokio::time::sleep(delay).await;
                self.republish(task_id, next.retry_count).await;
            }
            TimeoutDecision::Exhausted(pending) => {
                let (task, stage) = pending.into_parts();
                let attempts = task.retry_count.saturating_add(1);
                warn!(
                    workflow_id = %task.workflow_id,
                    %task_id,
                    %stage,
                    attempts,
                    "task timed out, retries exhausted"
                );
                let outcome = DispatchOutcome::RetryExhausted {
                    stage,
                    task,
                    error: AgentError::timeout(attempts),
                };
                if self.forward(outcome).is_err() {
                    warn!(%task_id, "outcome receiver dropped, timeout not reported");
                }
            }
        }
    }

    async fn republish(&self, task_id: TaskId, retry_count: u32) {
        let Some(envelope) = self.inner.pending.mark_redispatched(task_id, retry_count) else {
            debug!(%task_id, retry_count, "task settled during backoff");
            return;
        };
        let timeout_ms = envelope.timeout_ms;
        let channel = envelope.agent_type.task_channel();
        match envelope.to_value() {
            Ok(wire) => {
                if let Err(err) = self.inner.bus.publish(&channel, wire).await {
                    warn!(
                        %task_id,
                        %channel,
                        error = %err,
                        "re-publish failed, waiting for timeout"
                    );
                }
            }
            Err(err) => {
                warn!(%task_id, error = %err, "re-publish encoding failed, waiting for timeout");
            }
        }
        self.arm_timer(task_id, retry_count, timeout_ms);
    }
}
