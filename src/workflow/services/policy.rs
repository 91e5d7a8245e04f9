//! Per-stage execution policy.

use crate::envelope::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// How a `partial` result affects stage advancement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialPolicy {
    /// Fail the workflow with `PARTIAL_SUCCESS`, keeping the output as
    /// diagnostics.
    #[default]
    TreatAsFailure,
    /// Advance unless a blocking quality gate failed.
    AdvanceUnlessBlocking,
}

impl PartialPolicy {
    /// Returns `true` if a partial result with `output` may advance the
    /// stage.
    #[must_use]
    pub fn permits_advance(self, output: &Value) -> bool {
        match self {
            Self::TreatAsFailure => false,
            Self::AdvanceUnlessBlocking => failed_blocking_gates(output).is_empty(),
        }
    }
}

/// Names of failed blocking quality gates in a result output.
///
/// Gates live under `quality_gates` as `{name, passed, blocking?}`; a gate
/// without a `blocking` flag is blocking.
#[must_use]
pub fn failed_blocking_gates(output: &Value) -> Vec<String> {
    output
        .get("quality_gates")
        .and_then(Value::as_array)
        .map(|gates| {
            gates
                .iter()
                .filter(|gate| {
                    let passed = gate.get("passed").and_then(Value::as_bool).unwrap_or(false);
                    let blocking = gate.get("blocking").and_then(Value::as_bool).unwrap_or(true);
                    blocking && !passed
                })
                .map(|gate| {
                    gate.get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("unnamed")
                        .to_owned()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Overrides applied to one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagePolicy {
    partial: PartialPolicy,
    timeout_ms: Option<u64>,
    max_retries: Option<u32>,
}

impl StagePolicy {
    /// Creates a policy with the default partial handling and no overrides.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            partial: PartialPolicy::TreatAsFailure,
            timeout_ms: None,
            max_retries: None,
        }
    }

    /// Sets the partial-result policy.
    #[must_use]
    pub const fn with_partial(mut self, partial: PartialPolicy) -> Self {
        self.partial = partial;
        self
    }

    /// Overrides the per-attempt deadline.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Overrides the attempt budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Policies for every stage, with process-wide fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePolicies {
    default_timeout_ms: u64,
    default_max_retries: u32,
    stages: HashMap<Stage, StagePolicy>,
}

impl Default for StagePolicies {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS, DEFAULT_MAX_RETRIES)
    }
}

impl StagePolicies {
    /// Creates policies with the given fallbacks and no stage overrides.
    #[must_use]
    pub fn new(default_timeout_ms: u64, default_max_retries: u32) -> Self {
        Self {
            default_timeout_ms,
            default_max_retries,
            stages: HashMap::new(),
        }
    }

    /// Sets the policy for `stage`.
    #[must_use]
    pub fn with_stage(mut self, stage: Stage, policy: StagePolicy) -> Self {
        self.stages.insert(stage, policy);
        self
    }

    /// Returns the partial-result policy for `stage`.
    #[must_use]
    pub fn partial_policy(&self, stage: &Stage) -> PartialPolicy {
        self.stages
            .get(stage)
            .map(|policy| policy.partial)
            .unwrap_or_default()
    }

    /// Returns the per-attempt deadline for `stage`.
    #[must_use]
    pub fn timeout_ms(&self, stage: &Stage) -> u64 {
        self.stages
            .get(stage)
            .and_then(|policy| policy.timeout_ms)
            .unwrap_or(self.default_timeout_ms)
    }

    /// Returns the attempt budget for `stage`.
    #[must_use]
    pub fn max_retries(&self, stage: &Stage) -> u32 {
        self.stages
            .get(stage)
            .and_then(|policy| policy.max_retries)
            .unwrap_or(self.default_max_retries)
    }
}
