//! Unit tests for agent registry service orchestration.

use std::sync::Arc;
use std::time::Duration;

use crate::agent::{
    adapters::memory::InMemoryAgentRepository,
    domain::{AgentHeartbeat, AgentId, AgentRegistration, AgentStatus, PersistedAgentData},
    ports::{AgentRepository, AgentRepositoryError, MockAgentRepository},
    services::{
        AgentRegistryError, AgentRegistryService, HeartbeatListener, RegisterAgentRequest,
        RegistrationListener,
    },
};
use crate::bus::{EventBus, InMemoryEventBus};
use crate::contract::SemVer;
use crate::contract::builtin::builtin_registry;
use crate::envelope::{
    AgentType, ErrorCode, HEARTBEAT_CHANNEL, PlatformId, REGISTRATION_CHANNEL,
};
use chrono::TimeDelta;
use eyre::{Result, ensure, eyre};
use mockable::{Clock, DefaultClock};
use rstest::{fixture, rstest};
use serde_json::json;
use tokio::time::sleep;

type TestService = AgentRegistryService<InMemoryAgentRepository, DefaultClock>;

#[fixture]
fn service() -> TestService {
    AgentRegistryService::new(
        Arc::new(InMemoryAgentRepository::new()),
        Arc::new(builtin_registry().expect("built-in contracts are valid")),
        Arc::new(DefaultClock),
    )
}

fn acme() -> PlatformId {
    PlatformId::new("acme").expect("valid platform")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn registered_agent_is_resolved_globally(service: TestService) -> Result<()> {
    let created = service
        .register(
            RegisterAgentRequest::new(AgentType::Validation, "1.2.0").with_concurrency_limit(4),
        )
        .await?;

    let resolved = service.resolve(AgentType::Validation, None).await?;

    ensure!(resolved.as_ref() == Some(&created));
    ensure!(created.concurrency_limit() == 4);
    ensure!(service.resolve(AgentType::Deployment, None).await?.is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_scope_is_a_conflict(service: TestService) -> Result<()> {
    service
        .register(RegisterAgentRequest::new(AgentType::Scaffold, "1.2.0"))
        .await?;

    let err = service
        .register(RegisterAgentRequest::new(AgentType::Scaffold, "1.1.0"))
        .await
        .err()
        .ok_or_else(|| eyre!("second global registration should fail"))?;

    ensure!(matches!(
        err,
        AgentRegistryError::Conflict {
            agent_type: AgentType::Scaffold,
            platform_id: None,
        }
    ));
    ensure!(err.code() == Some(ErrorCode::Conflict));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn platform_registration_overrides_global_only_for_its_platform(
    service: TestService,
) -> Result<()> {
    let global = service
        .register(RegisterAgentRequest::new(AgentType::E2e, "1.2.0"))
        .await?;
    let scoped = service
        .register(RegisterAgentRequest::new(AgentType::E2e, "1.2.0").with_platform(acme()))
        .await?;
    let other = PlatformId::new("globex")?;

    let for_acme = service.resolve(AgentType::E2e, Some(&acme())).await?;
    let for_other = service.resolve(AgentType::E2e, Some(&other)).await?;

    ensure!(for_acme.map(|agent| agent.id()) == Some(scoped.id()));
    ensure!(for_other.map(|agent| agent.id()) == Some(global.id()));

    let duplicate = service
        .register(RegisterAgentRequest::new(AgentType::E2e, "1.2.0").with_platform(acme()))
        .await;
    ensure!(matches!(
        duplicate,
        Err(AgentRegistryError::Conflict { platform_id: Some(ref id), .. }) if *id == acme()
    ));
    Ok(())
}

#[rstest]
#[case("1.0.0", true)]
#[case("1.2.0", true)]
#[case("0.9.0", false)]
#[case("2.0.0", false)]
#[tokio::test(flavor = "multi_thread")]
async fn registration_requires_a_supported_contract_version(
    service: TestService,
    #[case] version: &str,
    #[case] accepted: bool,
) -> Result<()> {
    let result = service
        .register(RegisterAgentRequest::new(AgentType::Integration, version))
        .await;

    if accepted {
        ensure!(result.is_ok(), "{version} should be accepted: {result:?}");
    } else {
        ensure!(matches!(
            result,
            Err(AgentRegistryError::UnsupportedContractVersion { .. })
        ));
    }
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn heartbeat_for_unknown_agent_is_rejected(service: TestService) -> Result<()> {
    let stranger = AgentId::new();

    let result = service
        .record_heartbeat(&AgentHeartbeat::new(stranger, AgentType::Scaffold))
        .await;

    ensure!(matches!(result, Err(AgentRegistryError::UnknownAgent(id)) if id == stranger));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn health_report_marks_silent_agents_stale_until_they_beat_again(
    service: TestService,
) -> Result<()> {
    let quiet = service
        .register(RegisterAgentRequest::new(AgentType::Deployment, "1.2.0"))
        .await?;
    let window = Duration::from_secs(30);
    let later = quiet.last_heartbeat_at() + TimeDelta::seconds(90);

    let report = service.health_report(later, window).await?;

    ensure!(report.stale().map(|agent| agent.agent_id).collect::<Vec<_>>() == vec![quiet.id()]);
    ensure!(report.active_count() == 0);
    ensure!(report.stale_after_ms == 30_000);
    ensure!(report.agents.first().map(|agent| agent.silent_for_ms) == Some(90_000));
    let stored = service.find_by_id(quiet.id()).await?;
    ensure!(stored.map(|agent| agent.status()) == Some(AgentStatus::Stale));

    let revived = service
        .record_heartbeat(&AgentHeartbeat::new(quiet.id(), AgentType::Deployment))
        .await?;
    ensure!(revived.status() == AgentStatus::Active);
    Ok(())
}

fn holder_silent_for(seconds: i64, platform_id: Option<PlatformId>) -> AgentRegistration {
    let now = DefaultClock.utc();
    AgentRegistration::from_persisted(PersistedAgentData {
        id: AgentId::new(),
        agent_type: AgentType::Deployment,
        platform_id,
        contract_version: SemVer::parse("1.2.0").expect("valid version"),
        concurrency_limit: 1,
        status: AgentStatus::Active,
        in_flight: 0,
        registered_at: now - TimeDelta::seconds(seconds),
        last_heartbeat_at: now - TimeDelta::seconds(seconds),
    })
}

fn service_over(repository: &Arc<InMemoryAgentRepository>) -> TestService {
    AgentRegistryService::new(
        Arc::clone(repository),
        Arc::new(builtin_registry().expect("built-in contracts are valid")),
        Arc::new(DefaultClock),
    )
    .with_stale_after(Duration::from_secs(30))
}

#[rstest]
#[case::global(None)]
#[case::platform(Some(acme()))]
#[tokio::test(flavor = "multi_thread")]
async fn active_holder_keeps_its_scope(#[case] platform_id: Option<PlatformId>) -> Result<()> {
    let repository = Arc::new(InMemoryAgentRepository::new());
    let holder = holder_silent_for(5, platform_id.clone());
    repository.register(&holder).await?;
    let service = service_over(&repository);

    let mut request = RegisterAgentRequest::new(AgentType::Deployment, "1.2.0");
    if let Some(platform) = platform_id {
        request = request.with_platform(platform);
    }
    let result = service.register(request).await;

    ensure!(matches!(result, Err(AgentRegistryError::Conflict { .. })));
    ensure!(service.find_by_id(holder.id()).await?.is_some());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stale_holder_is_replaced_by_a_new_registration() -> Result<()> {
    let repository = Arc::new(InMemoryAgentRepository::new());
    let holder = holder_silent_for(90, Some(acme()));
    repository.register(&holder).await?;
    let service = service_over(&repository);

    let replacement = service
        .register(RegisterAgentRequest::new(AgentType::Deployment, "1.2.0").with_platform(acme()))
        .await?;

    let resolved = service.resolve(AgentType::Deployment, Some(&acme())).await?;
    ensure!(resolved.map(|agent| agent.id()) == Some(replacement.id()));
    ensure!(service.find_by_id(holder.id()).await?.is_none());
    ensure!(service.list_all().await?.len() == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deregistered_agent_frees_its_scope(service: TestService) -> Result<()> {
    let first = service
        .register(RegisterAgentRequest::new(AgentType::Scaffold, "1.2.0"))
        .await?;

    let removed = service.deregister(first.id()).await?;
    ensure!(removed.id() == first.id());
    ensure!(service.resolve(AgentType::Scaffold, None).await?.is_none());

    let second = service
        .register(RegisterAgentRequest::new(AgentType::Scaffold, "1.2.0"))
        .await?;
    ensure!(second.id() != first.id());

    let again = service.deregister(first.id()).await;
    ensure!(matches!(again, Err(AgentRegistryError::UnknownAgent(id)) if id == first.id()));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn repository_failures_are_not_reported_as_conflicts() -> Result<()> {
    let mut repository = MockAgentRepository::new();
    repository
        .expect_find_by_scope()
        .returning(|_, _| Ok(None));
    repository.expect_register().times(1).returning(|_| {
        Err(AgentRepositoryError::persistence(std::io::Error::other(
            "disk unavailable",
        )))
    });
    let service = AgentRegistryService::new(
        Arc::new(repository),
        Arc::new(builtin_registry()?),
        Arc::new(DefaultClock),
    );

    let err = service
        .register(RegisterAgentRequest::new(AgentType::Scaffold, "1.2.0"))
        .await
        .err()
        .ok_or_else(|| eyre!("registration should fail"))?;

    ensure!(matches!(err, AgentRegistryError::Repository(_)));
    ensure!(err.code().is_none());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn listeners_register_agents_and_record_heartbeats_from_the_bus(
    service: TestService,
) -> Result<()> {
    let bus = InMemoryEventBus::new(16);
    RegistrationListener::new(service.clone()).attach(&bus).await?;
    HeartbeatListener::new(service.clone()).attach(&bus).await?;

    bus.publish(
        REGISTRATION_CHANNEL,
        json!({ "agent_type": "validation", "contract_version": "1.2.0", "concurrency_limit": 2 }),
    )
    .await?;
    let mut registered = None;
    for _ in 0..100 {
        registered = service.resolve(AgentType::Validation, None).await?;
        if registered.is_some() {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    let agent = registered.ok_or_else(|| eyre!("agent was not registered"))?;

    bus.publish(
        HEARTBEAT_CHANNEL,
        json!({ "agent_id": agent.id(), "agent_type": "validation", "in_flight": 2 }),
    )
    .await?;
    let mut in_flight = 0;
    for _ in 0..100 {
        let current = service.find_by_id(agent.id()).await?;
        in_flight = current.map_or(0, |found| found.in_flight());
        if in_flight == 2 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    ensure!(in_flight == 2, "heartbeat was not recorded");

    bus.publish(HEARTBEAT_CHANNEL, json!({ "garbage": true })).await?;
    bus.publish(
        REGISTRATION_CHANNEL,
        json!({ "agent_type": "validation", "contract_version": "1.2.0" }),
    )
    .await?;
    sleep(Duration::from_millis(50)).await;
    ensure!(service.list_all().await?.len() == 1);
    Ok(())
}
