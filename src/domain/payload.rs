//! Request payloads and transport results.
//!
//! A payload carries the parameters of a request, the built HTTP request (if
//! the operation needs one) and an optional file transfer. The payload shape
//! decides which transport call a lane worker performs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Lane;
use crate::error::{RestlaneError, Result};

/// HTTP method of an [`ApiRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// A fully built request, ready for the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Form parameters (URL-encoded by the transport)
    pub params: BTreeMap<String, String>,
    pub timeout_ms: u64,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, url: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            params: BTreeMap::new(),
            timeout_ms: 120_000,
        }
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// One file part of a multipart upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipartFile {
    pub field_name: String,
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl MultipartFile {
    pub fn jpeg(field_name: &str, file_name: &str, data: Vec<u8>) -> Self {
        Self {
            field_name: field_name.to_string(),
            file_name: file_name.to_string(),
            mime_type: "image/jpeg".to_string(),
            data,
        }
    }
}

/// Long-running file transfer carried by a SLOW lane payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transfer {
    /// Stream `source_url` into the local `destination`
    Download { source_url: String, destination: PathBuf },
    /// Multipart form upload of text fields plus file parts
    Multipart {
        fields: BTreeMap<String, String>,
        files: Vec<MultipartFile>,
    },
    /// Upload a single local file
    Upload { source: PathBuf },
}

impl Transfer {
    /// The resource progress reports refer to
    pub fn resource(&self) -> String {
        match self {
            Self::Download { destination, .. } => destination.display().to_string(),
            Self::Multipart { files, .. } => files
                .iter()
                .map(|f| f.file_name.as_str())
                .collect::<Vec<_>>()
                .join(","),
            Self::Upload { source } => source.display().to_string(),
        }
    }
}

/// Which transport call a payload maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Simple,
    Download,
    Multipart,
    Upload,
}

impl CallKind {
    pub fn is_file_transfer(&self) -> bool {
        !matches!(self, Self::Simple)
    }
}

/// Data associated with a request record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Caller parameters (e.g. login form fields)
    pub params: Value,
    /// Built HTTP request; required for every call except downloads
    pub request: Option<ApiRequest>,
    /// File transfer; only valid on the SLOW lane
    pub transfer: Option<Transfer>,
}

impl Payload {
    pub fn new(params: Value) -> Self {
        Self {
            params,
            request: None,
            transfer: None,
        }
    }

    pub fn with_request(mut self, request: ApiRequest) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_transfer(mut self, transfer: Transfer) -> Self {
        self.transfer = Some(transfer);
        self
    }

    /// Call kind for the given lane. FAST lane payloads are always simple calls.
    pub fn call_kind(&self, lane: Lane) -> CallKind {
        if lane == Lane::Fast {
            return CallKind::Simple;
        }
        match &self.transfer {
            Some(Transfer::Download { .. }) => CallKind::Download,
            Some(Transfer::Multipart { .. }) => CallKind::Multipart,
            Some(Transfer::Upload { .. }) => CallKind::Upload,
            None => CallKind::Simple,
        }
    }

    /// Check that the payload can be executed on `lane`
    pub fn validate(&self, lane: Lane) -> Result<()> {
        if lane == Lane::Fast && self.transfer.is_some() {
            return Err(RestlaneError::InvalidArgument(
                "file transfers must use the slow lane".to_string(),
            ));
        }
        let kind = self.call_kind(lane);
        if kind != CallKind::Download && self.request.is_none() {
            return Err(RestlaneError::InvalidArgument(format!(
                "{:?} call requires a built request",
                kind
            )));
        }
        if let Some(Transfer::Multipart { files, .. }) = &self.transfer
            && files.is_empty()
        {
            return Err(RestlaneError::InvalidArgument(
                "multipart upload without files".to_string(),
            ));
        }
        Ok(())
    }

    /// The resource named in progress reports
    pub fn resource(&self) -> String {
        match (&self.transfer, &self.request) {
            (Some(transfer), _) => transfer.resource(),
            (None, Some(request)) => request.url.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Result code handed to completion callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ResultCode {
    Failure = 0,
    Success = 1,
}

impl ResultCode {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Opaque transport response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status; 0 when the request never produced one
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    /// Response carried by a failed transport call
    pub fn failure(status: u16, message: &str) -> Self {
        Self::new(status, serde_json::json!({ "error": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> ApiRequest {
        ApiRequest::new(HttpMethod::Post, "http://localhost/login")
    }

    #[test]
    fn test_fast_lane_is_always_simple() {
        let payload = Payload::new(Value::Null).with_transfer(Transfer::Upload {
            source: PathBuf::from("/tmp/a.jpg"),
        });
        assert_eq!(payload.call_kind(Lane::Fast), CallKind::Simple);
        assert_eq!(payload.call_kind(Lane::Slow), CallKind::Upload);
    }

    #[test]
    fn test_slow_lane_call_kinds() {
        let download = Payload::new(Value::Null).with_transfer(Transfer::Download {
            source_url: "http://localhost/pic".to_string(),
            destination: PathBuf::from("/tmp/pic"),
        });
        assert_eq!(download.call_kind(Lane::Slow), CallKind::Download);

        let multipart = Payload::new(Value::Null).with_transfer(Transfer::Multipart {
            fields: BTreeMap::new(),
            files: vec![MultipartFile::jpeg("image", "a.jpg", vec![1, 2])],
        });
        assert_eq!(multipart.call_kind(Lane::Slow), CallKind::Multipart);

        let simple = Payload::new(json!({"user": "x"})).with_request(request());
        assert_eq!(simple.call_kind(Lane::Slow), CallKind::Simple);
        assert!(!CallKind::Simple.is_file_transfer());
        assert!(CallKind::Download.is_file_transfer());
    }

    #[test]
    fn test_validate_rejects_transfer_on_fast_lane() {
        let payload = Payload::new(Value::Null)
            .with_request(request())
            .with_transfer(Transfer::Upload {
                source: PathBuf::from("/tmp/a"),
            });
        assert!(matches!(
            payload.validate(Lane::Fast),
            Err(RestlaneError::InvalidArgument(_))
        ));
        assert!(payload.validate(Lane::Slow).is_ok());
    }

    #[test]
    fn test_validate_requires_request_except_download() {
        let bare = Payload::new(json!({"user": "x"}));
        assert!(bare.validate(Lane::Fast).is_err());

        let download = Payload::new(Value::Null).with_transfer(Transfer::Download {
            source_url: "http://localhost/pic".to_string(),
            destination: PathBuf::from("/tmp/pic"),
        });
        assert!(download.validate(Lane::Slow).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_multipart() {
        let payload = Payload::new(Value::Null)
            .with_request(request())
            .with_transfer(Transfer::Multipart {
                fields: BTreeMap::new(),
                files: vec![],
            });
        assert!(payload.validate(Lane::Slow).is_err());
    }

    #[test]
    fn test_resource_names() {
        let download = Payload::new(Value::Null).with_transfer(Transfer::Download {
            source_url: "http://localhost/pic".to_string(),
            destination: PathBuf::from("/tmp/pic.jpg"),
        });
        assert_eq!(download.resource(), "/tmp/pic.jpg");

        let simple = Payload::new(Value::Null).with_request(request());
        assert_eq!(simple.resource(), "http://localhost/login");
    }

    #[test]
    fn test_result_code_values() {
        assert_eq!(ResultCode::Success as u8, 1);
        assert_eq!(ResultCode::Failure as u8, 0);
        assert!(ResultCode::Success.is_success());
        assert!(!ResultCode::Failure.is_success());
    }

    #[test]
    fn test_response_failure_body() {
        let response = Response::failure(503, "unavailable");
        assert_eq!(response.status, 503);
        assert_eq!(response.body["error"], "unavailable");
    }
}
