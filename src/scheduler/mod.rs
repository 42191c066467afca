//! Two-lane request scheduler.
//!
//! This module provides:
//! - **LaneQueues**: FAST and SLOW FIFO queues plus the slow-lane transfer flag,
//!   with the rule that picks the next head to dispatch.
//! - **Scheduler**: the polling loop, the admission rendezvous and one worker
//!   task per lane.
//!
//! # Architecture
//!
//! 1. Submitters push records onto a lane queue (state WAITING)
//! 2. The loop selects an eligible head and marks it PROCESSING
//! 3. The lane worker performs the transport call and reports progress
//! 4. The outcome completes the head, runs its callback and releases the loop
//!
//! # Example
//!
//! ```ignore
//! use restlane::scheduler::Scheduler;
//! use restlane::domain::{Lane, RequestRecord, completion_fn, no_progress};
//!
//! let scheduler = Scheduler::start(config.scheduler.clone(), transport);
//! scheduler.submit(record, completion_fn(|id, code, resp| { /* ... */ }), no_progress())?;
//! ```

mod core;
mod queue;
mod worker;

pub use self::core::Scheduler;
pub use queue::{LaneEntry, LaneQueues, SchedulerSnapshot};
