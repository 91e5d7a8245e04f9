//! Tokio-backed in-process event bus.
//!
//! Fan-out channels use a `broadcast` sender per channel. Work-queue
//! channels keep one bounded `mpsc` sender per consumer and hand messages
//! out round-robin. Every subscription is driven by its own task that
//! awaits each handler before taking the next message.

use crate::bus::ports::{
    BusError, BusHealth, BusMessage, BusResult, EventBus, MessageHandler, SubscriptionHandle,
};
use async_trait::async_trait;
use dashmap::DashMap;
use mockable::{Clock, DefaultClock};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Buffer size per channel and per work-queue consumer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

struct Channel {
    fanout: broadcast::Sender<BusMessage>,
    queue: Option<WorkQueue>,
}

#[derive(Default)]
struct WorkQueue {
    consumers: Vec<mpsc::Sender<BusMessage>>,
    cursor: usize,
}

impl WorkQueue {
    /// Hands `message` to the next consumer with room, pruning closed ones.
    fn deliver(&mut self, message: BusMessage) -> bool {
        let mut pending = message;
        for _ in 0..self.consumers.len() {
            if self.cursor >= self.consumers.len() {
                self.cursor = 0;
            }
            let Some(consumer) = self.consumers.get(self.cursor) else {
                return false;
            };
            match consumer.try_send(pending) {
                Ok(()) => {
                    self.cursor = self.cursor.saturating_add(1);
                    return true;
                }
                Err(mpsc::error::TrySendError::Full(returned)) => {
                    pending = returned;
                    self.cursor = self.cursor.saturating_add(1);
                }
                Err(mpsc::error::TrySendError::Closed(returned)) => {
                    pending = returned;
                    self.consumers.remove(self.cursor);
                }
            }
        }
        false
    }

    fn live_consumers(&self) -> usize {
        self.consumers.iter().filter(|tx| !tx.is_closed()).count()
    }
}

struct Inner<C> {
    channels: DashMap<String, Channel>,
    capacity: usize,
    closed: AtomicBool,
    clock: C,
}

/// In-process [`EventBus`] for single-process deployments and tests.
///
/// There is no transport to lose, so reconnection never happens here.
pub struct InMemoryEventBus<C = DefaultClock>
where
    C: Clock + Send + Sync + 'static,
{
    inner: Arc<Inner<C>>,
}

impl<C> Clone for InMemoryEventBus<C>
where
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl InMemoryEventBus {
    /// Creates a bus buffering up to `capacity` messages per channel.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, DefaultClock)
    }
}

impl<C> InMemoryEventBus<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates a bus stamping messages with `clock`.
    #[must_use]
    pub fn with_clock(capacity: usize, clock: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                channels: DashMap::new(),
                capacity: capacity.max(1),
                closed: AtomicBool::new(false),
                clock,
            }),
        }
    }

    /// Stops accepting publishes and ends every subscription.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.channels.clear();
    }

    fn ensure_open(&self) -> BusResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        Ok(())
    }

    fn new_channel(&self) -> Channel {
        let (fanout, _) = broadcast::channel(self.inner.capacity);
        Channel {
            fanout,
            queue: None,
        }
    }
}

fn validate_channel(channel: &str) -> BusResult<()> {
    if channel.trim().is_empty() {
        return Err(BusError::InvalidChannel(channel.to_owned()));
    }
    Ok(())
}

async fn deliver(handler: &Arc<dyn MessageHandler>, message: BusMessage) {
    let channel = message.channel.clone();
    let message_id = message.id;
    let task_handler = Arc::clone(handler);
    match tokio::spawn(async move { task_handler.handle(message).await }).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(%channel, %message_id, error = %err, "message handler failed");
        }
        Err(join_error) => {
            warn!(%channel, %message_id, error = %join_error, "message handler panicked");
        }
    }
}

#[async_trait]
impl<C> EventBus for InMemoryEventBus<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn publish(&self, channel: &str, payload: Value) -> BusResult<usize> {
        self.ensure_open()?;
        validate_channel(channel)?;
        let message = BusMessage::new(channel, payload, self.inner.clock.utc());

        let Some(mut entry) = self.inner.channels.get_mut(channel) else {
            debug!(%channel, "no subscribers, message dropped");
            return Ok(0);
        };
        if let Some(queue) = entry.queue.as_mut() {
            let delivered = queue.deliver(message);
            if !delivered {
                warn!(%channel, "no work-queue consumer available, message dropped");
            }
            return Ok(usize::from(delivered));
        }
        let delivered = entry.fanout.send(message).unwrap_or(0);
        debug!(%channel, delivered, "message published");
        Ok(delivered)
    }

    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> BusResult<SubscriptionHandle> {
        self.ensure_open()?;
        validate_channel(channel)?;
        let mut entry = self
            .inner
            .channels
            .entry(channel.to_owned())
            .or_insert_with(|| self.new_channel());

        let name = channel.to_owned();
        let task = if let Some(queue) = entry.queue.as_mut() {
            let (tx, mut rx) = mpsc::channel(self.inner.capacity);
            queue.consumers.push(tx);
            tokio::spawn(async move {
                while let Some(message) = rx.recv().await {
                    deliver(&handler, message).await;
                }
                debug!(channel = %name, "work-queue subscription ended");
            })
        } else {
            let mut rx = entry.fanout.subscribe();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(message) => deliver(&handler, message).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(channel = %name, skipped, "subscriber lagged, messages dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                debug!(channel = %name, "subscription ended");
            })
        };
        drop(entry);
        debug!(%channel, "subscribed");
        Ok(SubscriptionHandle::new(channel, task.abort_handle()))
    }

    async fn declare_work_queue(&self, channel: &str) -> BusResult<()> {
        self.ensure_open()?;
        validate_channel(channel)?;
        let mut entry = self
            .inner
            .channels
            .entry(channel.to_owned())
            .or_insert_with(|| self.new_channel());
        if entry.queue.is_some() {
            return Ok(());
        }
        if entry.fanout.receiver_count() > 0 {
            return Err(BusError::ChannelMode(channel.to_owned()));
        }
        entry.queue = Some(WorkQueue::default());
        debug!(%channel, "work queue declared");
        Ok(())
    }

    async fn health(&self) -> BusHealth {
        let subscribers = self
            .inner
            .channels
            .iter()
            .map(|entry| {
                entry
                    .queue
                    .as_ref()
                    .map_or_else(|| entry.fanout.receiver_count(), WorkQueue::live_consumers)
            })
            .sum();
        BusHealth {
            ok: !self.inner.closed.load(Ordering::SeqCst),
            channels: self.inner.channels.len(),
            subscribers,
        }
    }
}
