pub mod bus;
pub mod types;

pub use bus::{EventBus, EventBusError, EventBusResult, SharedEventBus};
pub use types::DevForgeEvent;
