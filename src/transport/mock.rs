//! Scriptable in-memory transport
//!
//! MockTransport answers every call after a configurable delay. Individual
//! targets (request URL, download source URL) can be scripted to fail, hang
//! forever, panic or take longer. Every call start/finish is appended to a
//! shared timeline so tests can assert ordering against their own callbacks.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{ProgressReporter, Transport, TransportError};
use crate::domain::{ApiRequest, CallKind, MultipartFile, Response};

/// A call observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCall {
    pub kind: CallKind,
    pub target: String,
}

#[derive(Debug, Clone)]
enum Script {
    Delay(Duration),
    Fail { code: u16, message: String },
    Hang,
    Panic,
}

struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scriptable transport for tests and demos
pub struct MockTransport {
    delay: Duration,
    progress_steps: Vec<f64>,
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<TransportCall>>,
    timeline: Arc<Mutex<Vec<String>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Instant responses, progress reported at 50% and 100%
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            progress_steps: vec![0.5, 1.0],
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            timeline: Arc::new(Mutex::new(Vec::new())),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delay applied to every unscripted call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Progress fractions reported by transfer calls
    pub fn with_progress_steps(mut self, steps: Vec<f64>) -> Self {
        self.progress_steps = steps;
        self
    }

    /// Share a timeline with the test so callbacks can append to it
    pub fn with_timeline(mut self, timeline: Arc<Mutex<Vec<String>>>) -> Self {
        self.timeline = timeline;
        self
    }

    pub fn delay_target(&self, target: &str, delay: Duration) {
        self.script(target, Script::Delay(delay));
    }

    pub fn fail_target(&self, target: &str, code: u16, message: &str) {
        self.script(
            target,
            Script::Fail {
                code,
                message: message.to_string(),
            },
        );
    }

    /// The call for `target` never returns
    pub fn hang_target(&self, target: &str) {
        self.script(target, Script::Hang);
    }

    pub fn panic_target(&self, target: &str) {
        self.script(target, Script::Panic);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn timeline(&self) -> Arc<Mutex<Vec<String>>> {
        self.timeline.clone()
    }

    /// Highest number of calls observed running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn script(&self, target: &str, script: Script) {
        lock(&self.scripts).insert(target.to_string(), script);
    }

    async fn perform(
        &self,
        kind: CallKind,
        target: &str,
        progress: Option<&ProgressReporter>,
    ) -> Result<Response, TransportError> {
        lock(&self.calls).push(TransportCall {
            kind,
            target: target.to_string(),
        });
        lock(&self.timeline).push(format!("start:{}", target));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard {
            counter: &self.in_flight,
        };

        let script = lock(&self.scripts).get(target).cloned();
        let (delay, failure) = match script {
            Some(Script::Hang) => futures::future::pending().await,
            Some(Script::Panic) => panic!("scripted transport panic for {}", target),
            Some(Script::Delay(delay)) => (delay, None),
            Some(Script::Fail { code, message }) => (self.delay, Some((code, message))),
            None => (self.delay, None),
        };

        match progress {
            Some(reporter) if !self.progress_steps.is_empty() => {
                let step_delay = delay / self.progress_steps.len() as u32;
                for fraction in &self.progress_steps {
                    tokio::time::sleep(step_delay).await;
                    reporter.report(*fraction);
                }
            }
            _ => tokio::time::sleep(delay).await,
        }

        lock(&self.timeline).push(format!("finish:{}", target));

        match failure {
            Some((code, message)) if code == 0 => Err(TransportError::Network(message)),
            Some((code, message)) => Err(TransportError::Status { code, message }),
            None => Ok(Response::ok(json!({
                "target": target,
                "kind": format!("{:?}", kind).to_lowercase(),
            }))),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn simple_call(&self, request: &ApiRequest) -> Result<Response, TransportError> {
        self.perform(CallKind::Simple, &request.url, None).await
    }

    async fn upload(
        &self,
        _source: &Path,
        request: &ApiRequest,
        progress: &ProgressReporter,
    ) -> Result<Response, TransportError> {
        self.perform(CallKind::Upload, &request.url, Some(progress)).await
    }

    async fn multipart_upload(
        &self,
        _fields: &BTreeMap<String, String>,
        _files: &[MultipartFile],
        request: &ApiRequest,
        progress: &ProgressReporter,
    ) -> Result<Response, TransportError> {
        self.perform(CallKind::Multipart, &request.url, Some(progress)).await
    }

    async fn download(
        &self,
        source_url: &str,
        destination: &Path,
        progress: &ProgressReporter,
    ) -> Result<Response, TransportError> {
        let response = self.perform(CallKind::Download, source_url, Some(progress)).await?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(destination, source_url.as_bytes()).await?;
        Ok(response)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
