//! Event bus and dispatch engine.
//!
//! Producers post `EngineEvent`s to the `CoreEngine`; the engine routes them
//! by id range and publishes `Notification`s on the `EventBus`, where
//! subscribers registered for that category receive them.

mod bus;
mod engine;
mod types;

pub use bus::{EventBus, Handler, Subscription};
pub use engine::{CoreEngine, Routed};
pub use types::{EngineEvent, EventBody, Notification, NotificationBody};
