//! In-process event bus.

mod bus;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, InMemoryEventBus};
