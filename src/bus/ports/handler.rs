//! Asynchronous message handlers.

use super::BusMessage;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Result returned by a handler. Errors are logged by the bus.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Callback invoked once per delivered message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one message.
    ///
    /// # Errors
    ///
    /// Returned errors are logged; the subscription stays active.
    async fn handle(&self, message: BusMessage) -> HandlerResult;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(BusMessage) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, message: BusMessage) -> HandlerResult {
        (self.0)(message).await
    }
}

/// Wraps an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(callback: F) -> Arc<dyn MessageHandler>
where
    F: Fn(BusMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler(callback))
}
