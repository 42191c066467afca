//! Restlane - a two-lane REST request scheduler
//!
//! Requests are queued on a FAST or SLOW lane, admitted one at a time by a
//! scheduling loop and executed by one worker per lane. Outcomes flow back
//! through an event dispatch engine to category subscribers.

pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod id;
pub mod logging;
pub mod rest;
pub mod scheduler;
pub mod transport;

pub use config::Config;
pub use error::{RestlaneError, Result};
pub use events::{CoreEngine, EngineEvent, EventBus, Notification, Subscription};
pub use rest::RestGateway;
pub use scheduler::Scheduler;
pub use transport::{Transport, TransportError};
