//! Domain types for Restlane
//!
//! This module contains all core domain types:
//! - EventId / Category: numeric event ids and their range classification
//! - RequestRecord: one unit of schedulable work with its lifecycle state
//! - Payload: request parameters, built request, optional file transfer
//! - Response / ResultCode: what completion callbacks receive

pub mod event_id;
pub mod payload;
pub mod record;

pub use event_id::{
    Category, EventId, LOCAL_EVENT_RANGE, LocalEvent, REST_EVENT_RANGE, RestEvent, SOCKET_EVENT_RANGE, SocketEvent,
};
pub use payload::{ApiRequest, CallKind, HttpMethod, MultipartFile, Payload, Response, ResultCode, Transfer};
pub use record::{
    CompletionCallback, Lane, ProgressCallback, RequestRecord, RequestState, completion_fn, no_progress, progress_fn,
};
