//! Workflow aggregate root and its state machine.

use super::{WorkflowDomainError, WorkflowEvent, WorkflowEventType, WorkflowStatus};
use crate::envelope::{ErrorCode, PlatformId, WorkflowId};
use crate::stage::{Stage, StageTable, WorkflowType};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Error detail recorded on a failed workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Triggering error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Stage that failed.
    pub stage: Option<Stage>,
    /// Preserved output or validation errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Value>,
}

impl FailureInfo {
    /// Creates failure detail without diagnostics.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            stage: None,
            diagnostics: None,
        }
    }

    /// Attaches diagnostics.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Value) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }
}

/// Parameter object for creating a workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDraft {
    /// Workflow type selecting the stage sequence.
    pub workflow_type: WorkflowType,
    /// Display name; also the default project name.
    pub name: String,
    /// Free-form parameters used to build stage payloads.
    pub params: Value,
    /// Platform whose contract overrides apply.
    pub platform_id: Option<PlatformId>,
}

/// Workflow aggregate root.
///
/// `current_stage` is always a member of the stage sequence for
/// `workflow_type`; it only moves forward, one stage at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    id: WorkflowId,
    workflow_type: WorkflowType,
    name: String,
    params: Value,
    platform_id: Option<PlatformId>,
    status: WorkflowStatus,
    current_stage: Stage,
    stage_index: usize,
    total_stages: usize,
    progress_percentage: u8,
    failure: Option<FailureInfo>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Creates a workflow in `initiated` status at the first stage of its
    /// sequence.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::EmptyName`] for a blank name,
    /// [`WorkflowDomainError::InvalidParams`] when params are neither an
    /// object nor null, or [`WorkflowDomainError::EmptySequence`] when the
    /// table has no stages for the type.
    pub fn new(
        draft: WorkflowDraft,
        table: &StageTable,
        clock: &impl Clock,
    ) -> Result<Self, WorkflowDomainError> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(WorkflowDomainError::EmptyName);
        }
        let params = match draft.params {
            Value::Null => Value::Object(Map::new()),
            object @ Value::Object(_) => object,
            _ => return Err(WorkflowDomainError::InvalidParams),
        };
        let first = table
            .first_stage(draft.workflow_type)
            .ok_or(WorkflowDomainError::EmptySequence(draft.workflow_type))?;
        let timestamp = clock.utc();

        Ok(Self {
            id: WorkflowId::new(),
            workflow_type: draft.workflow_type,
            name: name.to_owned(),
            params,
            platform_id: draft.platform_id,
            status: WorkflowStatus::Initiated,
            current_stage: first.clone(),
            stage_index: 0,
            total_stages: table.stages_for(draft.workflow_type).len(),
            progress_percentage: 0,
            failure: None,
            created_at: timestamp,
            updated_at: timestamp,
            completed_at: None,
        })
    }

    /// Returns the workflow identifier.
    #[must_use]
    pub const fn id(&self) -> WorkflowId {
        self.id
    }

    /// Returns the workflow type.
    #[must_use]
    pub const fn workflow_type(&self) -> WorkflowType {
        self.workflow_type
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parameters object.
    #[must_use]
    pub const fn params(&self) -> &Value {
        &self.params
    }

    /// Returns the platform scope, if any.
    #[must_use]
    pub const fn platform_id(&self) -> Option<&PlatformId> {
        self.platform_id.as_ref()
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> WorkflowStatus {
        self.status
    }

    /// Returns the current stage.
    #[must_use]
    pub const fn current_stage(&self) -> &Stage {
        &self.current_stage
    }

    /// Returns the zero-based position of the current stage.
    #[must_use]
    pub const fn stage_index(&self) -> usize {
        self.stage_index
    }

    /// Returns the length of the stage sequence.
    #[must_use]
    pub const fn total_stages(&self) -> usize {
        self.total_stages
    }

    /// Returns progress in whole percent.
    #[must_use]
    pub const fn progress_percentage(&self) -> u8 {
        self.progress_percentage
    }

    /// Returns the failure detail of a failed workflow.
    #[must_use]
    pub const fn failure(&self) -> Option<&FailureInfo> {
        self.failure.as_ref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest transition timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the completion timestamp.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns `true` while the current stage is executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == WorkflowStatus::Running
    }

    /// Returns a label for the state-machine state, such as
    /// `running(validation)` or `paused`.
    #[must_use]
    pub fn state_label(&self) -> String {
        match self.status {
            WorkflowStatus::Running => format!("running({})", self.current_stage),
            other => other.as_str().to_owned(),
        }
    }

    /// Starts the first stage.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::IllegalTransition`] unless the workflow
    /// is `initiated`.
    pub fn start(&mut self, clock: &impl Clock) -> Result<WorkflowEvent, WorkflowDomainError> {
        if self.status != WorkflowStatus::Initiated {
            return Err(self.illegal("start"));
        }
        self.status = WorkflowStatus::Running;
        self.progress_percentage = percent(self.stage_index, self.total_stages);
        self.touch(clock);
        Ok(self.event(
            WorkflowEventType::Started,
            json!({
                "stage": self.current_stage,
                "progress_percentage": self.progress_percentage,
            }),
            clock,
        ))
    }

    /// Records success of `completed` and moves to the next stage, or to
    /// `completed` after the last one.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::IllegalTransition`] unless the workflow
    /// is running `completed`, or [`WorkflowDomainError::UnknownStage`] when
    /// the current stage is missing from the table.
    pub fn advance(
        &mut self,
        completed: &Stage,
        table: &StageTable,
        clock: &impl Clock,
    ) -> Result<WorkflowEvent, WorkflowDomainError> {
        if !self.is_running() || *completed != self.current_stage {
            return Err(self.illegal(format!("advance from '{completed}'")));
        }

        let Some(next) = table
            .next_stage(&self.current_stage, self.workflow_type)?
            .cloned()
        else {
            self.status = WorkflowStatus::Completed;
            self.progress_percentage = 100;
            self.touch(clock);
            self.completed_at = Some(self.updated_at);
            return Ok(self.event(
                WorkflowEventType::Completed,
                json!({ "stage": self.current_stage, "progress_percentage": 100 }),
                clock,
            ));
        };

        let previous = std::mem::replace(&mut self.current_stage, next);
        self.stage_index = self.stage_index.saturating_add(1);
        self.progress_percentage = percent(self.stage_index, self.total_stages);
        self.touch(clock);
        Ok(self.event(
            WorkflowEventType::StageAdvanced,
            json!({
                "from": previous,
                "to": self.current_stage,
                "stage_index": self.stage_index,
                "progress_percentage": self.progress_percentage,
            }),
            clock,
        ))
    }

    /// Fails the running stage.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::IllegalTransition`] unless the workflow
    /// is running.
    pub fn fail(
        &mut self,
        mut failure: FailureInfo,
        clock: &impl Clock,
    ) -> Result<WorkflowEvent, WorkflowDomainError> {
        if !self.is_running() {
            return Err(self.illegal("fail"));
        }
        failure.stage = Some(self.current_stage.clone());
        let payload = json!({
            "stage": self.current_stage,
            "code": failure.code,
            "message": failure.message,
            "diagnostics": failure.diagnostics,
        });
        self.status = WorkflowStatus::Failed;
        self.failure = Some(failure);
        self.touch(clock);
        Ok(self.event(WorkflowEventType::Failed, payload, clock))
    }

    /// Suspends the workflow at its current stage.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::IllegalTransition`] unless the workflow
    /// is initiated or running.
    pub fn pause(&mut self, clock: &impl Clock) -> Result<WorkflowEvent, WorkflowDomainError> {
        if !matches!(
            self.status,
            WorkflowStatus::Initiated | WorkflowStatus::Running
        ) {
            return Err(self.illegal("pause"));
        }
        self.status = WorkflowStatus::Paused;
        self.touch(clock);
        Ok(self.event(
            WorkflowEventType::Paused,
            json!({ "stage": self.current_stage }),
            clock,
        ))
    }

    /// Resumes a paused workflow at the same stage.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::IllegalTransition`] unless the workflow
    /// is paused.
    pub fn resume(&mut self, clock: &impl Clock) -> Result<WorkflowEvent, WorkflowDomainError> {
        if self.status != WorkflowStatus::Paused {
            return Err(self.illegal("resume"));
        }
        self.status = WorkflowStatus::Running;
        self.progress_percentage = percent(self.stage_index, self.total_stages);
        self.touch(clock);
        Ok(self.event(
            WorkflowEventType::Resumed,
            json!({ "stage": self.current_stage }),
            clock,
        ))
    }

    /// Cancels a non-terminal workflow.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowDomainError::IllegalTransition`] when the workflow
    /// is already terminal.
    pub fn cancel(&mut self, clock: &impl Clock) -> Result<WorkflowEvent, WorkflowDomainError> {
        if self.status.is_terminal() {
            return Err(self.illegal("cancel"));
        }
        let previous = self.status;
        self.status = WorkflowStatus::Cancelled;
        self.touch(clock);
        Ok(self.event(
            WorkflowEventType::Cancelled,
            json!({ "stage": self.current_stage, "previous_status": previous }),
            clock,
        ))
    }

    /// Creates an event for this workflow.
    #[must_use]
    pub fn event(
        &self,
        event_type: WorkflowEventType,
        payload: Value,
        clock: &impl Clock,
    ) -> WorkflowEvent {
        WorkflowEvent::new(self.id, event_type, payload, clock)
    }

    fn illegal(&self, transition: impl Into<String>) -> WorkflowDomainError {
        WorkflowDomainError::IllegalTransition {
            workflow_id: self.id,
            state: self.state_label(),
            transition: transition.into(),
        }
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}

/// Whole-percent progress after reaching the stage at `index`.
fn percent(index: usize, total: usize) -> u8 {
    index
        .saturating_add(1)
        .min(total)
        .saturating_mul(100)
        .checked_div(total)
        .and_then(|value| u8::try_from(value).ok())
        .unwrap_or(0)
}
