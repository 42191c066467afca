//! Request record and related types
//!
//! A RequestRecord is one unit of schedulable work: an event id, the lane it
//! runs on, its payload, its lifecycle state and the callbacks attached at
//! submission time.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{Category, EventId, Payload, Response, ResultCode};
use crate::error::{RestlaneError, Result};
use crate::id::{generate_request_id, now_ms};

/// Invoked once when the record completes: `(event_id, result, response)`
pub type CompletionCallback = Arc<dyn Fn(EventId, ResultCode, &Response) + Send + Sync>;

/// Invoked while the record is processing: `(event_id, fraction_done, resource)`
pub type ProgressCallback = Arc<dyn Fn(EventId, f64, &str) + Send + Sync>;

/// Wrap a closure as a [`CompletionCallback`]
pub fn completion_fn<F>(f: F) -> CompletionCallback
where
    F: Fn(EventId, ResultCode, &Response) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`ProgressCallback`]
pub fn progress_fn<F>(f: F) -> ProgressCallback
where
    F: Fn(EventId, f64, &str) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Progress callback that ignores every report
pub fn no_progress() -> ProgressCallback {
    progress_fn(|_, _, _| {})
}

/// Priority lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    /// Simple calls, always served first
    Fast,
    /// Simple calls and file transfers
    Slow,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::Fast => write!(f, "fast"),
            Lane::Slow => write!(f, "slow"),
        }
    }
}

/// Lifecycle state of a request record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    /// Built, not yet submitted
    None,
    /// Queued in its lane
    Waiting,
    /// Dispatched to a lane worker
    Processing,
    /// Outcome reported; about to be discarded
    Completed,
}

impl RequestState {
    /// The only state this one may move to
    pub fn next(&self) -> Option<RequestState> {
        match self {
            Self::None => Some(Self::Waiting),
            Self::Waiting => Some(Self::Processing),
            Self::Processing => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// One unit of schedulable work
pub struct RequestRecord {
    /// Unique identifier ("req-1738300800123-002a")
    pub id: String,

    /// Semantic operation (e.g. login)
    pub event_id: EventId,

    /// Lane chosen by the submitter
    pub lane: Lane,

    /// Parameters, built request, optional transfer
    pub payload: Payload,

    /// Unix timestamp in milliseconds
    pub created_at: u64,

    state: RequestState,
    on_complete: Option<CompletionCallback>,
    on_progress: Option<ProgressCallback>,
}

impl RequestRecord {
    /// Create a record in state `None`
    pub fn new(event_id: impl Into<EventId>, lane: Lane, payload: Payload) -> Self {
        Self {
            id: generate_request_id(),
            event_id: event_id.into(),
            lane,
            payload,
            created_at: now_ms(),
            state: RequestState::None,
            on_complete: None,
            on_progress: None,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Category derived from the event id range
    pub fn category(&self) -> Option<Category> {
        self.event_id.category()
    }

    /// Move to `next`. Only single forward steps are accepted.
    pub fn advance(&mut self, next: RequestState) -> Result<()> {
        if self.state.next() != Some(next) {
            return Err(RestlaneError::InvalidArgument(format!(
                "record {} cannot move from {:?} to {:?}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    pub(crate) fn attach_callbacks(&mut self, on_complete: CompletionCallback, on_progress: ProgressCallback) {
        self.on_complete = Some(on_complete);
        self.on_progress = Some(on_progress);
    }

    pub(crate) fn on_complete(&self) -> Option<CompletionCallback> {
        self.on_complete.clone()
    }

    pub(crate) fn on_progress(&self) -> Option<ProgressCallback> {
        self.on_progress.clone()
    }
}

impl fmt::Debug for RequestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRecord")
            .field("id", &self.id)
            .field("event_id", &self.event_id)
            .field("lane", &self.lane)
            .field("state", &self.state)
            .field("payload", &self.payload)
            .field("has_on_complete", &self.on_complete.is_some())
            .field("has_on_progress", &self.on_progress.is_some())
            .finish()
    }
}
