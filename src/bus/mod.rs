//! Channel-based publish/subscribe used between the orchestrator and
//! agents, and by external observers.
//!
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`], including a decorator that
//!   retries transport failures with backoff

pub mod adapters;
pub mod ports;

pub use adapters::memory::InMemoryEventBus;
pub use adapters::retrying::{DEFAULT_TRANSPORT_ATTEMPTS, RetryingEventBus};
pub use ports::{
    BusError, BusHealth, BusMessage, BusResult, EventBus, HandlerResult, MessageHandler,
    SubscriptionHandle, handler_fn, publish_json,
};
