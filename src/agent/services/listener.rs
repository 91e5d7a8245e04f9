//! Bus listeners feeding the agent registry.
//!
//! Heartbeats and registrations are advisory: a malformed or rejected
//! message is logged by the bus and never reaches the dispatcher.

use super::{AgentRegistryService, RegisterAgentRequest};
use crate::agent::{domain::AgentHeartbeat, ports::AgentRepository};
use crate::bus::{BusMessage, BusResult, EventBus, HandlerResult, SubscriptionHandle, handler_fn};
use crate::envelope::{HEARTBEAT_CHANNEL, REGISTRATION_CHANNEL};
use mockable::Clock;

/// Records heartbeats published on the heartbeat channel.
pub struct HeartbeatListener<R, C>
where
    R: AgentRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    registry: AgentRegistryService<R, C>,
}

impl<R, C> HeartbeatListener<R, C>
where
    R: AgentRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a listener writing into `registry`.
    #[must_use]
    pub const fn new(registry: AgentRegistryService<R, C>) -> Self {
        Self { registry }
    }

    /// Subscribes to the heartbeat channel on `bus`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::bus::BusError`] when the subscription fails.
    pub async fn attach<B>(&self, bus: &B) -> BusResult<SubscriptionHandle>
    where
        B: EventBus + ?Sized,
    {
        let registry = self.registry.clone();
        bus.subscribe(
            HEARTBEAT_CHANNEL,
            handler_fn(move |message: BusMessage| {
                let service = registry.clone();
                async move {
                    let heartbeat: AgentHeartbeat = serde_json::from_value(message.payload)?;
                    service.record_heartbeat(&heartbeat).await?;
                    HandlerResult::Ok(())
                }
            }),
        )
        .await
    }
}

/// Registers agents announcing themselves on the registration channel.
pub struct RegistrationListener<R, C>
where
    R: AgentRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    registry: AgentRegistryService<R, C>,
}

impl<R, C> RegistrationListener<R, C>
where
    R: AgentRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a listener writing into `registry`.
    #[must_use]
    pub const fn new(registry: AgentRegistryService<R, C>) -> Self {
        Self { registry }
    }

    /// Subscribes to the registration channel on `bus`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::bus::BusError`] when the subscription fails.
    pub async fn attach<B>(&self, bus: &B) -> BusResult<SubscriptionHandle>
    where
        B: EventBus + ?Sized,
    {
        let registry = self.registry.clone();
        bus.subscribe(
            REGISTRATION_CHANNEL,
            handler_fn(move |message: BusMessage| {
                let service = registry.clone();
                async move {
                    let request: RegisterAgentRequest = serde_json::from_value(message.payload)?;
                    service.register(request).await?;
                    HandlerResult::Ok(())
                }
            }),
        )
        .await
    }
}
