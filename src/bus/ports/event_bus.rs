//! Event bus port.

use super::MessageHandler;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::AbortHandle;
use uuid::Uuid;

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// One message travelling on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    /// Unique message identifier.
    pub id: Uuid,
    /// Channel the message was published on.
    pub channel: String,
    /// JSON body.
    pub payload: Value,
    /// Publication timestamp.
    pub published_at: DateTime<Utc>,
}

impl BusMessage {
    /// Creates a message with a fresh identifier.
    #[must_use]
    pub fn new(channel: impl Into<String>, payload: Value, published_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            payload,
            published_at,
        }
    }
}

/// Liveness snapshot of a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusHealth {
    /// Whether the transport accepts publishes.
    pub ok: bool,
    /// Number of known channels.
    pub channels: usize,
    /// Number of live subscriptions across all channels.
    pub subscribers: usize,
}

/// Errors returned by bus implementations.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// The bus has been shut down.
    #[error("event bus is closed")]
    Closed,

    /// Channel names must be non-blank.
    #[error("invalid channel name '{0}'")]
    InvalidChannel(String),

    /// A work queue was declared on a channel that already has fan-out
    /// subscribers.
    #[error("channel '{0}' already has fan-out subscribers")]
    ChannelMode(String),

    /// A message could not be encoded.
    #[error("message serialization failed: {0}")]
    Serialization(String),

    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl BusError {
    /// Wraps a transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }
}

/// Handle to an active subscription.
///
/// Dropping the handle leaves the subscription running; call
/// [`SubscriptionHandle::unsubscribe`] to stop it.
#[derive(Debug)]
pub struct SubscriptionHandle {
    channel: String,
    task: AbortHandle,
}

impl SubscriptionHandle {
    /// Wraps the task that drives a subscription.
    #[must_use]
    pub fn new(channel: impl Into<String>, task: AbortHandle) -> Self {
        Self {
            channel: channel.into(),
            task,
        }
    }

    /// Returns the subscribed channel.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Returns `true` while the delivery task is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops delivery to this subscription.
    pub fn unsubscribe(self) {
        self.task.abort();
    }
}

/// Channel-based publish/subscribe transport.
///
/// Delivery is at-most-once. Each subscriber sees messages of one channel
/// in publication order; nothing is guaranteed across channels.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes `payload` on `channel` and returns how many subscribers
    /// received it. A publish nobody hears is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the transport cannot accept the message.
    async fn publish(&self, channel: &str, payload: Value) -> BusResult<usize>;

    /// Registers `handler` for every message on `channel`.
    ///
    /// Fan-out channels give each subscriber its own copy; work-queue
    /// channels hand each message to exactly one subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the subscription cannot be created.
    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> BusResult<SubscriptionHandle>;

    /// Marks `channel` as a competing-consumer queue.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ChannelMode`] when the channel already has
    /// fan-out subscribers.
    async fn declare_work_queue(&self, channel: &str) -> BusResult<()>;

    /// Returns a liveness snapshot.
    async fn health(&self) -> BusHealth;
}

/// Serializes `value` and publishes it on `channel`.
///
/// # Errors
///
/// Returns [`BusError::Serialization`] when `value` cannot be encoded, or
/// any error from [`EventBus::publish`].
pub async fn publish_json<B, T>(bus: &B, channel: &str, value: &T) -> BusResult<usize>
where
    B: EventBus + ?Sized,
    T: Serialize + Sync,
{
    let payload =
        serde_json::to_value(value).map_err(|err| BusError::Serialization(err.to_string()))?;
    bus.publish(channel, payload).await
}
