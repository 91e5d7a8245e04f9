//! Ordered stage sequences per workflow type.

use super::{Stage, StageError, UnknownStageError, WorkflowType, names};
use crate::envelope::{Action, AgentType};
use std::collections::HashMap;

/// Agent type and payload variant serving one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageRoute {
    /// Agent type whose queue receives the stage's task.
    pub agent_type: AgentType,
    /// Payload variant sent to that agent.
    pub action: Action,
}

impl StageRoute {
    /// Creates a route.
    #[must_use]
    pub const fn new(agent_type: AgentType, action: Action) -> Self {
        Self { agent_type, action }
    }
}

/// Immutable table mapping workflow types to stage sequences.
///
/// Workflow types without an explicit sequence use the default one. Every
/// answer is a pure function of the inputs and the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTable {
    sequences: HashMap<WorkflowType, Vec<Stage>>,
    default_sequence: Vec<Stage>,
    routes: HashMap<Stage, StageRoute>,
}

impl StageTable {
    /// Starts an empty builder.
    #[must_use]
    pub fn builder() -> StageTableBuilder {
        StageTableBuilder::default()
    }

    /// Builds the standard delivery table.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] only if the built-in definitions are
    /// inconsistent.
    pub fn builtin() -> Result<Self, StageError> {
        use super::names::{
            DEPLOYMENT, E2E_TESTING, IMPLEMENTATION, INITIALIZATION, INTEGRATION, SCAFFOLDING,
            VALIDATION,
        };

        Self::builder()
            .route(INITIALIZATION, AgentType::Scaffold, Action::Initialize)?
            .route(SCAFFOLDING, AgentType::Scaffold, Action::Scaffold)?
            .route(IMPLEMENTATION, AgentType::Scaffold, Action::Implement)?
            .route(VALIDATION, AgentType::Validation, Action::Validate)?
            .route(E2E_TESTING, AgentType::E2e, Action::RunE2e)?
            .route(INTEGRATION, AgentType::Integration, Action::Merge)?
            .route(DEPLOYMENT, AgentType::Deployment, Action::Deploy)?
            .sequence(
                WorkflowType::App,
                [
                    INITIALIZATION,
                    SCAFFOLDING,
                    VALIDATION,
                    E2E_TESTING,
                    INTEGRATION,
                    DEPLOYMENT,
                ],
            )?
            .sequence(
                WorkflowType::Feature,
                [
                    INITIALIZATION,
                    IMPLEMENTATION,
                    VALIDATION,
                    E2E_TESTING,
                    INTEGRATION,
                ],
            )?
            .sequence(WorkflowType::Bugfix, [INITIALIZATION, VALIDATION, E2E_TESTING])?
            .sequence(
                WorkflowType::Service,
                [
                    INITIALIZATION,
                    SCAFFOLDING,
                    VALIDATION,
                    INTEGRATION,
                    DEPLOYMENT,
                ],
            )?
            .default_sequence([INITIALIZATION, SCAFFOLDING, VALIDATION, DEPLOYMENT])?
            .build()
    }

    /// Returns the stage sequence for `workflow_type`, falling back to the
    /// default sequence for types without one.
    #[must_use]
    pub fn stages_for(&self, workflow_type: WorkflowType) -> &[Stage] {
        self.sequences
            .get(&workflow_type)
            .map_or(self.default_sequence.as_slice(), Vec::as_slice)
    }

    /// Returns `true` when `workflow_type` has its own sequence.
    #[must_use]
    pub fn has_explicit_sequence(&self, workflow_type: WorkflowType) -> bool {
        self.sequences.contains_key(&workflow_type)
    }

    /// Returns the first stage for `workflow_type`.
    #[must_use]
    pub fn first_stage(&self, workflow_type: WorkflowType) -> Option<&Stage> {
        self.stages_for(workflow_type).first()
    }

    /// Returns the stage after `current`, or `None` when `current` is last.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownStageError`] when `current` is not in the sequence
    /// for `workflow_type`.
    pub fn next_stage(
        &self,
        current: &Stage,
        workflow_type: WorkflowType,
    ) -> Result<Option<&Stage>, UnknownStageError> {
        let stages = self.stages_for(workflow_type);
        let index = stages
            .iter()
            .position(|stage| stage == current)
            .ok_or_else(|| UnknownStageError {
                stage: current.clone(),
                workflow_type,
            })?;
        Ok(stages.get(index.saturating_add(1)))
    }

    /// Returns the zero-based position of `stage` in the sequence.
    #[must_use]
    pub fn stage_index(&self, stage: &Stage, workflow_type: WorkflowType) -> Option<usize> {
        self.stages_for(workflow_type)
            .iter()
            .position(|candidate| candidate == stage)
    }

    /// Returns the agent route serving `stage`.
    #[must_use]
    pub fn route(&self, stage: &Stage) -> Option<StageRoute> {
        self.routes.get(stage).copied()
    }
}

/// Builder for [`StageTable`].
#[derive(Debug, Clone, Default)]
pub struct StageTableBuilder {
    sequences: HashMap<WorkflowType, Vec<Stage>>,
    default_sequence: Vec<Stage>,
    routes: HashMap<Stage, StageRoute>,
}

impl StageTableBuilder {
    /// Declares which agent serves `stage` and with which action.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::InvalidName`] for malformed stage names.
    pub fn route(
        mut self,
        stage: &str,
        agent_type: AgentType,
        action: Action,
    ) -> Result<Self, StageError> {
        self.routes
            .insert(Stage::new(stage)?, StageRoute::new(agent_type, action));
        Ok(self)
    }

    /// Sets the sequence for `workflow_type`.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] for malformed, repeated or missing stages.
    pub fn sequence<I, S>(
        mut self,
        workflow_type: WorkflowType,
        stages: I,
    ) -> Result<Self, StageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed = parse_sequence(stages, Some(workflow_type))?;
        self.sequences.insert(workflow_type, parsed);
        Ok(self)
    }

    /// Sets the fallback sequence.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] for malformed, repeated or missing stages.
    pub fn default_sequence<I, S>(mut self, stages: I) -> Result<Self, StageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.default_sequence = parse_sequence(stages, None)?;
        Ok(self)
    }

    /// Freezes the table.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::EmptySequence`] when no default sequence was
    /// set and [`StageError::MissingRoute`] when a sequenced stage has no
    /// route.
    pub fn build(self) -> Result<StageTable, StageError> {
        if self.default_sequence.is_empty() {
            return Err(StageError::EmptySequence(None));
        }
        let unrouted = self
            .sequences
            .values()
            .chain(std::iter::once(&self.default_sequence))
            .flatten()
            .find(|stage| !self.routes.contains_key(*stage));
        if let Some(stage) = unrouted {
            return Err(StageError::MissingRoute(stage.clone()));
        }
        Ok(StageTable {
            sequences: self.sequences,
            default_sequence: self.default_sequence,
            routes: self.routes,
        })
    }
}

fn parse_sequence<I, S>(
    stages: I,
    workflow_type: Option<WorkflowType>,
) -> Result<Vec<Stage>, StageError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed: Vec<Stage> = Vec::new();
    for raw in stages {
        let stage = Stage::new(raw.as_ref())?;
        if parsed.contains(&stage) {
            return Err(StageError::DuplicateStage {
                stage,
                workflow_type,
            });
        }
        parsed.push(stage);
    }
    if parsed.is_empty() {
        return Err(StageError::EmptySequence(workflow_type));
    }
    Ok(parsed)
}
