//! Port contracts for channel-based publish/subscribe.

pub mod event_bus;
pub mod handler;

#[cfg(test)]
pub use event_bus::MockEventBus;
pub use event_bus::{
    BusError, BusHealth, BusMessage, BusResult, EventBus, SubscriptionHandle, publish_json,
};
#[cfg(test)]
pub use handler::MockMessageHandler;
pub use handler::{HandlerResult, MessageHandler, handler_fn};
