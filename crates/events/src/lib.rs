//! The event types and queue that carry checker/attack facts from
//! producers (probes, the submission service) to the dispatcher.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::{Event, GameEvent};
pub use in_memory_bus::{BoundedEventQueue, QueueError};
