//! Run lifecycle events and the fan-out event bus.

mod bus;
mod types;

pub use bus::{EventBus, Subscription, DEFAULT_QUEUE_CAPACITY};
pub use types::RunEvent;
