//! Wiring host that assembles the orchestrator on an in-process bus and
//! keeps it running until interrupted.
//!
//! Usage:
//!
//! ```text
//! STAGEHAND_CONFIG=/etc/stagehand.toml RUST_LOG=stagehand=debug stagehand
//! ```
//!
//! Without `STAGEHAND_CONFIG` the built-in defaults apply. The bus lives
//! inside this process, so only agents and control callers linked into the
//! same process can reach it; the binary exposes no network transport and
//! no control surface of its own. Embedders that need out-of-process agents
//! provide their own [`EventBus`] adapter and reuse the same wiring.

use mockable::DefaultClock;
use stagehand::agent::{
    adapters::memory::InMemoryAgentRepository,
    ports::AgentRepository,
    services::{AgentRegistryService, HeartbeatListener, RegistrationListener},
};
use stagehand::bus::{BusError, EventBus, InMemoryEventBus, RetryingEventBus};
use stagehand::config::{ConfigError, OrchestratorConfig};
use stagehand::contract::{ContractError, builtin::builtin_registry};
use stagehand::dispatch::{AgentDispatcher, DispatchError};
use stagehand::envelope::AgentType;
use stagehand::stage::{StageError, StageTable};
use stagehand::telemetry::{TelemetryError, init_tracing};
use stagehand::workflow::{
    adapters::memory::{InMemoryWorkflowEventLog, InMemoryWorkflowRepository},
    services::{OrchestrationService, Pipeline},
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("invalid stage table: {0}")]
    Stages(#[from] StageError),
    #[error("invalid built-in contract: {0}")]
    Contracts(#[from] ContractError),
    #[error("failed to attach to the bus: {0}")]
    Bus(#[from] BusError),
    #[error("failed to start the dispatcher: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("failed to wait for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    run().await.map_err(Into::into)
}

async fn run() -> Result<(), StartupError> {
    let config = OrchestratorConfig::load()?;
    init_tracing()?;

    let transport = Arc::new(InMemoryEventBus::new(config.bus.channel_capacity));
    let bus = Arc::new(RetryingEventBus::new(
        Arc::clone(&transport),
        config.retry_policy(),
        config.bus.transport_max_attempts,
    ));
    for agent_type in AgentType::ALL {
        bus.declare_work_queue(&agent_type.task_channel()).await?;
    }
    let stages = Arc::new(StageTable::builtin()?);
    let contracts = Arc::new(builtin_registry()?);
    let policies = config.stage_policies(&stages)?;

    let (dispatcher, outcomes) = AgentDispatcher::new(Arc::clone(&bus), config.retry_policy());
    let results = dispatcher.listen().await?;
    let orchestrator = OrchestrationService::new(
        Arc::new(InMemoryWorkflowRepository::new()),
        Arc::new(InMemoryWorkflowEventLog::new()),
        dispatcher,
        Pipeline::new(stages, Arc::clone(&contracts)).with_policies(policies),
        Arc::new(DefaultClock),
    );
    let runner = tokio::spawn(async move { orchestrator.run(outcomes).await });

    let registry = AgentRegistryService::new(
        Arc::new(InMemoryAgentRepository::new()),
        contracts,
        Arc::new(DefaultClock),
    )
    .with_stale_after(config.heartbeat_stale_after());
    let registrations = RegistrationListener::new(registry.clone())
        .attach(&*bus)
        .await?;
    let heartbeats = HeartbeatListener::new(registry.clone())
        .attach(&*bus)
        .await?;
    let sweeper = spawn_health_sweep(registry, config.heartbeat_stale_after());

    info!(
        channel_capacity = config.bus.channel_capacity,
        transport_max_attempts = config.bus.transport_max_attempts,
        default_timeout_ms = config.dispatch.default_timeout_ms,
        default_max_retries = config.dispatch.default_max_retries,
        "stagehand orchestrator ready"
    );
    let signal = tokio::signal::ctrl_c().await;

    info!("shutting down");
    sweeper.abort();
    registrations.unsubscribe();
    heartbeats.unsubscribe();
    results.unsubscribe();
    runner.abort();
    transport.shutdown();
    signal.map_err(StartupError::Signal)
}

fn spawn_health_sweep<R>(
    registry: AgentRegistryService<R, DefaultClock>,
    stale_after: Duration,
) -> JoinHandle<()>
where
    R: AgentRepository + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(stale_after);
        loop {
            ticker.tick().await;
            match registry.health_now(stale_after).await {
                Ok(report) => {
                    for agent in report.stale() {
                        warn!(
                            agent_id = %agent.agent_id,
                            agent_type = %agent.agent_type,
                            silent_for_ms = agent.silent_for_ms,
                            "agent is stale"
                        );
                    }
                }
                Err(err) => warn!(error = %err, "agent health sweep failed"),
            }
        }
    })
}
