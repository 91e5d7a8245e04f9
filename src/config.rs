//! Orchestrator configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields
//! a working configuration. Values are validated after parsing.

use crate::bus::DEFAULT_TRANSPORT_ATTEMPTS;
use crate::dispatch::RetryPolicy;
use crate::envelope::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS};
use crate::stage::{Stage, StageTable};
use crate::workflow::services::{PartialPolicy, StagePolicies, StagePolicy};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "STAGEHAND_CONFIG";

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Task deadlines, attempt budget and backoff.
    pub dispatch: DispatchConfig,
    /// In-process bus sizing.
    pub bus: BusConfig,
    /// Agent health tracking.
    pub agents: AgentsConfig,
    /// Per-stage overrides keyed by stage name.
    pub stages: BTreeMap<String, StageConfig>,
}

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Per-attempt deadline for stages without an override.
    pub default_timeout_ms: u64,
    /// Attempt budget for stages without an override.
    pub default_max_retries: u32,
    /// Delay before the first retry.
    pub backoff_initial_ms: u64,
    /// Upper bound on the retry delay.
    pub backoff_max_ms: u64,
    /// Growth factor between consecutive retries.
    pub backoff_multiplier: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            default_max_retries: DEFAULT_MAX_RETRIES,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 30_000,
            backoff_multiplier: 2,
        }
    }
}

/// Event bus settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    /// Buffered messages per channel before slow subscribers lag.
    pub channel_capacity: usize,
    /// Attempts per bus operation before a transport error surfaces.
    pub transport_max_attempts: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1_024,
            transport_max_attempts: DEFAULT_TRANSPORT_ATTEMPTS,
        }
    }
}

/// Agent registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentsConfig {
    /// Silence after which an agent is reported stale.
    pub heartbeat_stale_after_ms: u64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            heartbeat_stale_after_ms: 30_000,
        }
    }
}

/// Overrides for one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageConfig {
    /// How partial results are treated.
    pub partial_policy: PartialPolicy,
    /// Per-attempt deadline override.
    pub timeout_ms: Option<u64>,
    /// Attempt budget override.
    pub max_retries: Option<u32>,
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn invalid(field: impl Into<String>, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        reason: reason.to_owned(),
    }
}

impl FromStr for OrchestratorConfig {
    type Err = ConfigError;

    fn from_str(contents: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }
}

impl OrchestratorConfig {
    /// Loads the file named by `STAGEHAND_CONFIG`, or the defaults when the
    /// variable is unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed or
    /// validated.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_path(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Reads and validates the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed or
    /// validated.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        contents.parse()
    }

    /// Rejects zero deadlines, budgets and capacities, multipliers below
    /// one and backoff ceilings below the initial delay.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dispatch = &self.dispatch;
        if dispatch.default_timeout_ms == 0 {
            return Err(invalid("dispatch.default_timeout_ms", "must be > 0"));
        }
        if dispatch.default_max_retries == 0 {
            return Err(invalid("dispatch.default_max_retries", "must be > 0"));
        }
        if dispatch.backoff_multiplier == 0 {
            return Err(invalid("dispatch.backoff_multiplier", "must be >= 1"));
        }
        if dispatch.backoff_max_ms < dispatch.backoff_initial_ms {
            return Err(invalid(
                "dispatch.backoff_max_ms",
                "must be >= dispatch.backoff_initial_ms",
            ));
        }
        if self.bus.channel_capacity == 0 {
            return Err(invalid("bus.channel_capacity", "must be > 0"));
        }
        if self.bus.transport_max_attempts == 0 {
            return Err(invalid("bus.transport_max_attempts", "must be > 0"));
        }
        if self.agents.heartbeat_stale_after_ms == 0 {
            return Err(invalid("agents.heartbeat_stale_after_ms", "must be > 0"));
        }
        for (name, stage) in &self.stages {
            if stage.timeout_ms == Some(0) {
                return Err(invalid(format!("stages.{name}.timeout_ms"), "must be > 0"));
            }
            if stage.max_retries == Some(0) {
                return Err(invalid(format!("stages.{name}.max_retries"), "must be > 0"));
            }
        }
        Ok(())
    }

    /// Returns the dispatcher backoff policy.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.dispatch.backoff_initial_ms),
            Duration::from_millis(self.dispatch.backoff_max_ms),
            self.dispatch.backoff_multiplier,
        )
    }

    /// Returns the heartbeat silence window.
    #[must_use]
    pub const fn heartbeat_stale_after(&self) -> Duration {
        Duration::from_millis(self.agents.heartbeat_stale_after_ms)
    }

    /// Builds stage policies, checking every override names a stage the
    /// table routes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for malformed or unrouted
    /// stage names.
    pub fn stage_policies(&self, table: &StageTable) -> Result<StagePolicies, ConfigError> {
        let mut policies = StagePolicies::new(
            self.dispatch.default_timeout_ms,
            self.dispatch.default_max_retries,
        );
        for (name, overrides) in &self.stages {
            let field = format!("stages.{name}");
            let stage = Stage::new(name.as_str())
                .map_err(|err| invalid(field.as_str(), &err.to_string()))?;
            if table.route(&stage).is_none() {
                return Err(invalid(field, "no route is defined for this stage"));
            }
            let mut policy = StagePolicy::new().with_partial(overrides.partial_policy);
            if let Some(timeout_ms) = overrides.timeout_ms {
                policy = policy.with_timeout_ms(timeout_ms);
            }
            if let Some(max_retries) = overrides.max_retries {
                policy = policy.with_max_retries(max_retries);
            }
            policies = policies.with_stage(stage, policy);
        }
        Ok(policies)
    }
}

#[cfg(test)]
mod tests {
    //! Configuration parsing and validation tests.

    use super::*;
    use crate::stage::names;
    use rstest::rstest;

    #[rstest]
    fn empty_document_yields_defaults() {
        let config: OrchestratorConfig = "".parse().expect("empty config is valid");

        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.dispatch.default_timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.heartbeat_stale_after(), Duration::from_secs(30));
        assert_eq!(config.bus.transport_max_attempts, DEFAULT_TRANSPORT_ATTEMPTS);
    }

    #[rstest]
    fn stage_overrides_become_policies() {
        let config: OrchestratorConfig = r#"
            [dispatch]
            default_timeout_ms = 60000
            backoff_initial_ms = 10
            backoff_max_ms = 40
            backoff_multiplier = 3

            [stages.validation]
            partial_policy = "advance_unless_blocking"
            max_retries = 5
        "#
        .parse()
        .expect("valid config");
        let table = StageTable::builtin().expect("built-in table");

        let policies = config.stage_policies(&table).expect("known stages");
        let validation = Stage::new(names::VALIDATION).expect("valid stage");
        let deployment = Stage::new(names::DEPLOYMENT).expect("valid stage");

        assert_eq!(
            policies.partial_policy(&validation),
            PartialPolicy::AdvanceUnlessBlocking
        );
        assert_eq!(policies.max_retries(&validation), 5);
        assert_eq!(policies.timeout_ms(&validation), 60_000);
        assert_eq!(policies.partial_policy(&deployment), PartialPolicy::TreatAsFailure);
        assert_eq!(policies.max_retries(&deployment), DEFAULT_MAX_RETRIES);
        assert_eq!(config.retry_policy().delay_for(2), Duration::from_millis(30));
        assert_eq!(config.retry_policy().delay_for(3), Duration::from_millis(40));
    }

    #[rstest]
    #[case("[dispatch]\ndefault_timeout_ms = 0", "dispatch.default_timeout_ms")]
    #[case("[dispatch]\ndefault_max_retries = 0", "dispatch.default_max_retries")]
    #[case("[dispatch]\nbackoff_multiplier = 0", "dispatch.backoff_multiplier")]
    #[case("[dispatch]\nbackoff_initial_ms = 50\nbackoff_max_ms = 10", "dispatch.backoff_max_ms")]
    #[case("[bus]\nchannel_capacity = 0", "bus.channel_capacity")]
    #[case("[bus]\ntransport_max_attempts = 0", "bus.transport_max_attempts")]
    #[case("[agents]\nheartbeat_stale_after_ms = 0", "agents.heartbeat_stale_after_ms")]
    #[case("[stages.validation]\ntimeout_ms = 0", "stages.validation.timeout_ms")]
    fn out_of_range_values_are_rejected(#[case] contents: &str, #[case] expected_field: &str) {
        let err = contents
            .parse::<OrchestratorConfig>()
            .expect_err("config should be rejected");

        assert!(
            matches!(err, ConfigError::InvalidValue { ref field, .. } if field == expected_field),
            "unexpected error: {err}"
        );
    }

    #[rstest]
    fn unknown_keys_are_parse_errors() {
        let err = "[bus]\ncapacity = 4"
            .parse::<OrchestratorConfig>()
            .expect_err("unknown key");

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[rstest]
    #[case("deploy_everything")]
    #[case("Not A Stage")]
    fn unrouted_stage_overrides_are_rejected(#[case] name: &str) {
        let mut config = OrchestratorConfig::default();
        config.stages.insert(name.to_owned(), StageConfig::default());
        let table = StageTable::builtin().expect("built-in table");

        let err = config.stage_policies(&table).expect_err("unknown stage");

        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[rstest]
    fn missing_file_reports_the_path() {
        let path = Path::new("/nonexistent/stagehand.toml");

        let err = OrchestratorConfig::from_path(path).expect_err("missing file");

        assert!(matches!(err, ConfigError::Io { path: ref reported, .. } if reported == path));
    }
}
