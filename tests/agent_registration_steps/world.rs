//! Shared world state for agent registration BDD scenarios.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::{Clock, DefaultClock};
use rstest::fixture;
use stagehand::agent::{
    adapters::memory::InMemoryAgentRepository,
    domain::AgentRegistration,
    services::{AgentRegistryError, AgentRegistryService, RegisterAgentRequest},
};
use stagehand::contract::{
    ContractRegistry,
    builtin::{builtin_registry_builder, contract_for},
};
use stagehand::envelope::{AgentType, PlatformId};

/// Service type used by the BDD world.
pub type TestRegistryService = AgentRegistryService<InMemoryAgentRepository, DefaultClock>;

/// Platform carrying its own contract overrides in every scenario.
pub const OVERRIDE_PLATFORM: &str = "acme";

/// Scenario world for agent registration behaviour tests.
pub struct RegistrationWorld {
    /// The registry service under test.
    pub service: TestRegistryService,
    /// Request queued by a given step.
    pub pending: Option<RegisterAgentRequest>,
    /// Result of the last registration attempt.
    pub last_result: Option<Result<AgentRegistration, AgentRegistryError>>,
    /// Global registrations made by given steps.
    pub global: Vec<AgentRegistration>,
    /// Platform registrations made by given steps.
    pub scoped: Vec<AgentRegistration>,
    /// Time the health report is evaluated at.
    pub now: DateTime<Utc>,
}

impl RegistrationWorld {
    /// Creates a world backed by built-in contracts plus an `acme` override
    /// for every agent type.
    ///
    /// # Panics
    ///
    /// Panics if the built-in contracts are rejected.
    #[must_use]
    pub fn new() -> Self {
        Self {
            service: AgentRegistryService::new(
                Arc::new(InMemoryAgentRepository::new()),
                Arc::new(contracts()),
                Arc::new(DefaultClock),
            ),
            pending: None,
            last_result: None,
            global: Vec::new(),
            scoped: Vec::new(),
            now: DefaultClock.utc(),
        }
    }
}

impl Default for RegistrationWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[expect(clippy::expect_used, reason = "fixture setup with built-in tables")]
fn contracts() -> ContractRegistry {
    let mut builder = builtin_registry_builder().expect("built-in contracts");
    let platform = PlatformId::new(OVERRIDE_PLATFORM).expect("platform id");
    for agent_type in AgentType::ALL {
        builder
            .register(contract_for(agent_type), Some(platform.clone()))
            .expect("platform contract");
    }
    builder.build()
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> RegistrationWorld {
    RegistrationWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

/// Parses an agent type named in a step.
///
/// # Errors
///
/// Returns an error for unknown agent types.
pub fn agent_type(name: &str) -> Result<AgentType, eyre::Report> {
    AgentType::try_from(name).map_err(|err| eyre::eyre!("{err}"))
}

/// Parses a platform named in a step.
///
/// # Errors
///
/// Returns an error for blank platform identifiers.
pub fn platform(name: &str) -> Result<PlatformId, eyre::Report> {
    PlatformId::new(name).map_err(|err| eyre::eyre!("{err}"))
}
