//! Error types for Restlane
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::domain::Lane;

/// All error types that can occur in Restlane
#[derive(Debug, Error)]
pub enum RestlaneError {
    /// Malformed submission (missing payload field, wrong lane, reused record)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Event id outside every known category range
    #[error("Unrecognized event: {0}")]
    UnrecognizedEvent(u32),

    /// Progress/outcome report for a lane whose head is not processing
    #[error("Stale report on {lane} lane: {reason}")]
    StaleReport { lane: Lane, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RestlaneError {
    /// Errors that are logged and absorbed instead of reaching the caller
    pub fn is_absorbed(&self) -> bool {
        matches!(self, Self::UnrecognizedEvent(_) | Self::StaleReport { .. })
    }
}

/// Result type alias for Restlane operations
pub type Result<T> = std::result::Result<T, RestlaneError>;
