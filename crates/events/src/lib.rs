//! Agent events and the bus that carries them.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::AgentEvent;
pub use in_memory_bus::{AgentBus, InMemoryBusError, InMemoryEventBus};
