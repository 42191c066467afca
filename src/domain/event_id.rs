//! Event identifiers and category classification.
//!
//! Every event carries a numeric id. The id alone decides which category it
//! belongs to; ranges are disjoint and contiguous per category.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Reserved id range for REST events
pub const REST_EVENT_RANGE: RangeInclusive<u32> = 1000..=1999;
/// Reserved id range for local events
pub const LOCAL_EVENT_RANGE: RangeInclusive<u32> = 2000..=2999;
/// Reserved id range for socket events
pub const SOCKET_EVENT_RANGE: RangeInclusive<u32> = 3000..=3999;

/// Category of an event, derived from its id range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Rest,
    Local,
    Socket,
}

impl Category {
    /// All categories, in range order
    pub const ALL: [Category; 3] = [Category::Rest, Category::Local, Category::Socket];

    /// Classify a raw id; `None` when it falls outside every known range
    pub fn classify(id: u32) -> Option<Self> {
        if REST_EVENT_RANGE.contains(&id) {
            Some(Self::Rest)
        } else if LOCAL_EVENT_RANGE.contains(&id) {
            Some(Self::Local)
        } else if SOCKET_EVENT_RANGE.contains(&id) {
            Some(Self::Socket)
        } else {
            None
        }
    }

    /// The id range reserved for this category
    pub fn range(&self) -> RangeInclusive<u32> {
        match self {
            Self::Rest => REST_EVENT_RANGE,
            Self::Local => LOCAL_EVENT_RANGE,
            Self::Socket => SOCKET_EVENT_RANGE,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rest => write!(f, "rest"),
            Self::Local => write!(f, "local"),
            Self::Socket => write!(f, "socket"),
        }
    }
}

/// Numeric event id. Any value is representable; classification may fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u32);

impl EventId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn category(&self) -> Option<Category> {
        Category::classify(self.0)
    }

    pub fn is_rest(&self) -> bool {
        self.category() == Some(Category::Rest)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for EventId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Named REST operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RestEvent {
    Login = 1000,
    NetworkError = 1001,
}

impl RestEvent {
    pub fn from_id(id: EventId) -> Option<Self> {
        match id.0 {
            1000 => Some(Self::Login),
            1001 => Some(Self::NetworkError),
            _ => None,
        }
    }
}

/// Named local (in-process) events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum LocalEvent {
    StartContactSync = 2000,
}

impl LocalEvent {
    pub fn from_id(id: EventId) -> Option<Self> {
        match id.0 {
            2000 => Some(Self::StartContactSync),
            _ => None,
        }
    }
}

/// Named socket events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SocketEvent {
    Connect = 3000,
}

impl SocketEvent {
    pub fn from_id(id: EventId) -> Option<Self> {
        match id.0 {
            3000 => Some(Self::Connect),
            _ => None,
        }
    }
}

macro_rules! impl_event_id_from {
    ($($name:ty),*) => {
        $(
            impl From<$name> for EventId {
                fn from(event: $name) -> Self {
                    EventId(event as u32)
                }
            }
        )*
    };
}

impl_event_id_from!(RestEvent, LocalEvent, SocketEvent);
