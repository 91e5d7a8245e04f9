//! Table of in-flight tasks.
//!
//! Entries are keyed by task identifier in a sharded map; a second index
//! keyed by `(workflow, stage)` holds at most one task per slot. Every
//! transition that settles a task does so by removing its entry, so a
//! result and a timeout racing for the same task resolve to exactly one
//! winner.

use super::{DispatchError, DispatchResult};
use crate::envelope::{TaskEnvelope, TaskId, TaskStatus, WorkflowId};
use crate::stage::Stage;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::AbortHandle;

/// One task owned by the dispatcher.
#[derive(Debug)]
pub struct PendingTask {
    envelope: TaskEnvelope,
    stage: Stage,
    timer: Option<AbortHandle>,
}

impl PendingTask {
    /// Returns the envelope as last published.
    #[must_use]
    pub const fn envelope(&self) -> &TaskEnvelope {
        &self.envelope
    }

    /// Returns the stage the task serves.
    #[must_use]
    pub const fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Splits the entry into its envelope and stage.
    #[must_use]
    pub fn into_parts(self) -> (TaskEnvelope, Stage) {
        (self.envelope, self.stage)
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// What to do after a timer fired.
#[derive(Debug)]
pub enum TimeoutDecision {
    /// The timer belongs to an attempt that is already settled.
    Stale,
    /// Another attempt fits the budget; publish this envelope after backoff.
    Retry(TaskEnvelope),
    /// The budget is spent; the entry has been removed.
    Exhausted(PendingTask),
}

/// Sharded table of in-flight tasks.
#[derive(Debug, Default)]
pub struct PendingTable {
    tasks: DashMap<TaskId, PendingTask>,
    slots: DashMap<(WorkflowId, Stage), TaskId>,
}

impl PendingTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the `(workflow, stage)` slot for `envelope`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::AlreadyPending`] when the slot is held and
    /// [`DispatchError::DuplicateTask`] when the task is already tracked.
    pub fn reserve(&self, envelope: TaskEnvelope, stage: Stage) -> DispatchResult<()> {
        let task_id = envelope.task_id;
        let workflow_id = envelope.workflow_id;
        match self.slots.entry((workflow_id, stage.clone())) {
            Entry::Occupied(slot) => Err(DispatchError::AlreadyPending {
                workflow_id,
                stage,
                pending: *slot.get(),
            }),
            Entry::Vacant(slot) => {
                if self.tasks.contains_key(&task_id) {
                    return Err(DispatchError::DuplicateTask(task_id));
                }
                self.tasks.insert(
                    task_id,
                    PendingTask {
                        envelope,
                        stage,
                        timer: None,
                    },
                );
                slot.insert(task_id);
                Ok(())
            }
        }
    }

    /// Stores the timer for attempt `retry_count`, or aborts it when the
    /// attempt is already settled.
    pub fn attach_timer(&self, task_id: TaskId, retry_count: u32, timer: AbortHandle) {
        match self.tasks.get_mut(&task_id) {
            Some(mut pending) if pending.envelope.retry_count == retry_count => {
                pending.timer = Some(timer);
            }
            _ => timer.abort(),
        }
    }

    /// Removes the entry for `task_id` if it belongs to `workflow_id`.
    ///
    /// The entry's timer is aborted; returns `None` for unknown, settled
    /// or mismatched tasks.
    pub fn claim(&self, task_id: TaskId, workflow_id: WorkflowId) -> Option<PendingTask> {
        let (_, pending) = self
            .tasks
            .remove_if(&task_id, |_, pending| pending.envelope.workflow_id == workflow_id)?;
        Some(self.settle(task_id, pending))
    }

    /// Applies a timer expiry for attempt `retry_count`.
    pub fn on_timeout(&self, task_id: TaskId, retry_count: u32) -> TimeoutDecision {
        let current_attempt = |pending: &PendingTask| {
            pending.envelope.retry_count == retry_count
                && pending.envelope.status == TaskStatus::Dispatched
        };

        if let Some((_, pending)) = self.tasks.remove_if(&task_id, |_, pending| {
            current_attempt(pending) && !pending.envelope.has_attempts_left()
        }) {
            let mut settled = self.settle(task_id, pending);
            settled.envelope.status = TaskStatus::TimedOut;
            return TimeoutDecision::Exhausted(settled);
        }

        let Some(mut pending) = self.tasks.get_mut(&task_id) else {
            return TimeoutDecision::Stale;
        };
        if !current_attempt(pending.value()) {
            return TimeoutDecision::Stale;
        }
        let mut next = pending.envelope.next_attempt();
        next.status = TaskStatus::TimedOut;
        pending.envelope = next.clone();
        pending.timer = None;
        TimeoutDecision::Retry(next)
    }

    /// Moves a timed-out task back to `dispatched` for attempt
    /// `retry_count`, returning the envelope to publish.
    ///
    /// Returns `None` when the task was settled or cancelled during the
    /// backoff.
    pub fn mark_redispatched(&self, task_id: TaskId, retry_count: u32) -> Option<TaskEnvelope> {
        let mut pending = self.tasks.get_mut(&task_id)?;
        if pending.envelope.retry_count != retry_count
            || pending.envelope.status != TaskStatus::TimedOut
        {
            return None;
        }
        pending.envelope.status = TaskStatus::Dispatched;
        Some(pending.envelope.clone())
    }

    /// Removes every entry of `workflow_id` and aborts their timers.
    pub fn drop_workflow(&self, workflow_id: WorkflowId) -> Vec<PendingTask> {
        let task_ids: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|entry| entry.envelope.workflow_id == workflow_id)
            .map(|entry| *entry.key())
            .collect();
        task_ids
            .into_iter()
            .filter_map(|task_id| {
                let (_, pending) = self.tasks.remove(&task_id)?;
                Some(self.settle(task_id, pending))
            })
            .collect()
    }

    /// Returns the task holding the `(workflow, stage)` slot.
    #[must_use]
    pub fn pending_for(&self, workflow_id: WorkflowId, stage: &Stage) -> Option<TaskId> {
        self.slots
            .get(&(workflow_id, stage.clone()))
            .map(|slot| *slot.value())
    }

    /// Returns `true` if `task_id` is in flight.
    #[must_use]
    pub fn contains(&self, task_id: TaskId) -> bool {
        self.tasks.contains_key(&task_id)
    }

    /// Returns the number of tasks in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` when nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn settle(&self, task_id: TaskId, mut pending: PendingTask) -> PendingTask {
        pending.cancel_timer();
        self.slots.remove_if(
            &(pending.envelope.workflow_id, pending.stage.clone()),
            |_, holder| *holder == task_id,
        );
        pending
    }
}
