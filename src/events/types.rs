//! Event and notification types.
//!
//! `EngineEvent` is what producers post into the dispatch engine inbox.
//! `Notification` is what subscribers receive from the bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Category, EventId, Lane, Payload, Response, ResultCode};

/// Inbound event for the dispatch engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub id: EventId,
    pub body: EventBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventBody {
    /// Ask for a REST call on the given lane
    Request { lane: Lane, payload: Payload },

    /// A REST call is making progress
    Progress { fraction: f64, resource: String },

    /// A REST call finished (successfully or not)
    Completed { result: ResultCode, response: Response },

    /// Local or socket signal with free-form data
    Signal { data: Value },
}

impl EngineEvent {
    pub fn request(id: impl Into<EventId>, lane: Lane, payload: Payload) -> Self {
        Self {
            id: id.into(),
            body: EventBody::Request { lane, payload },
        }
    }

    pub fn progress(id: impl Into<EventId>, fraction: f64, resource: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: EventBody::Progress {
                fraction,
                resource: resource.into(),
            },
        }
    }

    pub fn completed(id: impl Into<EventId>, result: ResultCode, response: Response) -> Self {
        Self {
            id: id.into(),
            body: EventBody::Completed { result, response },
        }
    }

    pub fn signal(id: impl Into<EventId>, data: Value) -> Self {
        Self {
            id: id.into(),
            body: EventBody::Signal { data },
        }
    }

    pub fn category(&self) -> Option<Category> {
        self.id.category()
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self.body {
            EventBody::Request { .. } => "request",
            EventBody::Progress { .. } => "progress",
            EventBody::Completed { .. } => "completed",
            EventBody::Signal { .. } => "signal",
        }
    }
}

/// What a subscriber receives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event_id: EventId,
    pub result: ResultCode,
    pub body: NotificationBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationBody {
    Response(Response),
    Progress { fraction: f64, resource: String },
    Payload { data: Value },
}

impl Notification {
    pub fn response(event_id: EventId, result: ResultCode, response: Response) -> Self {
        Self {
            event_id,
            result,
            body: NotificationBody::Response(response),
        }
    }

    /// Progress notifications always carry `Success`
    pub fn progress(event_id: EventId, fraction: f64, resource: impl Into<String>) -> Self {
        Self {
            event_id,
            result: ResultCode::Success,
            body: NotificationBody::Progress {
                fraction,
                resource: resource.into(),
            },
        }
    }

    pub fn payload(event_id: EventId, data: Value) -> Self {
        Self {
            event_id,
            result: ResultCode::Success,
            body: NotificationBody::Payload { data },
        }
    }

    pub fn is_progress(&self) -> bool {
        matches!(self.body, NotificationBody::Progress { .. })
    }
}
