//! Transport layer - the HTTP capability lane workers depend on
//!
//! This module provides:
//! - Transport trait: simple call, upload, multipart upload, download
//! - TransportError: opaque failures forwarded through the completion path
//! - ProgressReporter: sink for fractional progress of file transfers
//! - MockTransport: scriptable in-memory transport for tests

pub mod mock;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ApiRequest, MultipartFile, Response};

pub use mock::{MockTransport, TransportCall};

/// Blocking (from the worker's point of view) HTTP capability
#[async_trait]
pub trait Transport: Send + Sync {
    /// Plain request/response call, no progress stream
    async fn simple_call(&self, request: &ApiRequest) -> Result<Response, TransportError>;

    /// Upload a single local file
    async fn upload(
        &self,
        source: &Path,
        request: &ApiRequest,
        progress: &ProgressReporter,
    ) -> Result<Response, TransportError>;

    /// Multipart form upload
    async fn multipart_upload(
        &self,
        fields: &BTreeMap<String, String>,
        files: &[MultipartFile],
        request: &ApiRequest,
        progress: &ProgressReporter,
    ) -> Result<Response, TransportError>;

    /// Stream `source_url` into `destination`
    async fn download(
        &self,
        source_url: &str,
        destination: &Path,
        progress: &ProgressReporter,
    ) -> Result<Response, TransportError>;
}

/// Errors a transport call can end with
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport call panicked: {0}")]
    Panicked(String),
}

impl TransportError {
    /// The response handed to completion callbacks for this failure
    pub fn to_response(&self) -> Response {
        let status = match self {
            TransportError::Status { code, .. } => *code,
            _ => 0,
        };
        Response::failure(status, &self.to_string())
    }
}

/// Progress sink handed to transfer calls.
///
/// Fractions are clamped into `0.0..=1.0` before they are forwarded.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn Fn(f64) + Send + Sync>,
}

impl ProgressReporter {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        Self { sink: Arc::new(sink) }
    }

    /// A reporter that drops every report
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, fraction: f64) {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        (self.sink)(fraction);
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}
