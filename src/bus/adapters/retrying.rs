//! Transport retry decorator for any [`EventBus`].

use crate::bus::ports::{
    BusError, BusHealth, BusResult, EventBus, MessageHandler, SubscriptionHandle,
};
use crate::dispatch::RetryPolicy;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::warn;

/// Default number of attempts per bus operation.
pub const DEFAULT_TRANSPORT_ATTEMPTS: u32 = 5;

/// Wraps a bus so that [`BusError::Transport`] failures are retried with
/// backoff.
///
/// Only transport errors are retried. `Closed`, `InvalidChannel`,
/// `ChannelMode` and `Serialization` pass through on the first attempt,
/// as does the last transport error once `max_attempts` is spent.
#[derive(Debug)]
pub struct RetryingEventBus<B: ?Sized> {
    policy: RetryPolicy,
    max_attempts: u32,
    inner: Arc<B>,
}

impl<B> RetryingEventBus<B>
where
    B: EventBus + ?Sized,
{
    /// Wraps `inner`, making at most `max_attempts` attempts per operation.
    /// Zero attempts is treated as one.
    #[must_use]
    pub fn new(inner: Arc<B>, policy: RetryPolicy, max_attempts: u32) -> Self {
        Self {
            policy,
            max_attempts: max_attempts.max(1),
            inner,
        }
    }

    /// Returns the wrapped bus.
    #[must_use]
    pub const fn inner(&self) -> &Arc<B> {
        &self.inner
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, channel: &str, call: F) -> BusResult<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = BusResult<T>> + Send,
        T: Send,
    {
        let mut attempt: u32 = 1;
        loop {
            match call().await {
                Err(BusError::Transport(err)) if attempt < self.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        %channel,
                        operation,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transport error, retrying"
                    );
                    sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl<B> EventBus for RetryingEventBus<B>
where
    B: EventBus + ?Sized + 'static,
{
    async fn publish(&self, channel: &str, payload: Value) -> BusResult<usize> {
        let inner = &self.inner;
        let body = &payload;
        self.with_retry("publish", channel, move || inner.publish(channel, body.clone()))
            .await
    }

    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> BusResult<SubscriptionHandle> {
        let inner = &self.inner;
        let shared = &handler;
        self.with_retry("subscribe", channel, move || {
            inner.subscribe(channel, Arc::clone(shared))
        })
        .await
    }

    async fn declare_work_queue(&self, channel: &str) -> BusResult<()> {
        let inner = &self.inner;
        self.with_retry("declare_work_queue", channel, move || {
            inner.declare_work_queue(channel)
        })
        .await
    }

    async fn health(&self) -> BusHealth {
        self.inner.health().await
    }
}
