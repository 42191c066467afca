//! Core Engine - routes inbound events by category
//!
//! The engine owns an inbox drained by its own task. Producers either `post`
//! an event (queued, processed in order on the engine task) or call
//! `dispatch_now` to route it on their own context.
//!
//! Routing:
//! - REST request    -> submitted through the gateway
//! - REST progress   -> published to REST subscribers
//! - REST completion -> published to REST subscribers with its result code
//! - LOCAL / SOCKET  -> published to subscribers of that category
//! - unrecognized    -> logged and dropped

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::bus::EventBus;
use super::types::{EngineEvent, EventBody, Notification};
use crate::config::Config;
use crate::domain::Category;
use crate::error::RestlaneError;
use crate::rest::RestGateway;
use crate::scheduler::Scheduler;

/// What happened to a routed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Request queued with the scheduler under this record id
    Submitted(String),
    /// Notification delivered to this many handlers
    Published(usize),
    Dropped,
}

struct Router {
    bus: Arc<EventBus>,
    gateway: Arc<RestGateway>,
    log_events: bool,
}

impl Router {
    fn route(&self, event: EngineEvent) -> Routed {
        if self.log_events {
            log::info!("Event {} ({})", event.id, event.kind());
        }

        let Some(category) = event.category() else {
            log::warn!(
                "Dropping {} event: {}",
                event.kind(),
                RestlaneError::UnrecognizedEvent(event.id.raw())
            );
            return Routed::Dropped;
        };

        let id = event.id;
        match (category, event.body) {
            (Category::Rest, EventBody::Request { lane, payload }) => match self.gateway.submit(id, lane, payload) {
                Ok(request_id) => Routed::Submitted(request_id),
                Err(e) if e.is_absorbed() => {
                    log::warn!("Dropping event {}: {}", id, e);
                    Routed::Dropped
                }
                Err(e) => {
                    log::error!("Failed to submit event {}: {}", id, e);
                    Routed::Dropped
                }
            },
            (_, EventBody::Request { .. }) => {
                log::warn!("Dropping {} event {}: only REST events carry requests", category, id);
                Routed::Dropped
            }
            (_, EventBody::Progress { fraction, resource }) => {
                self.publish(Notification::progress(id, fraction, resource))
            }
            (_, EventBody::Completed { result, response }) => {
                self.publish(Notification::response(id, result, response))
            }
            (_, EventBody::Signal { data }) => self.publish(Notification::payload(id, data)),
        }
    }

    fn publish(&self, notification: Notification) -> Routed {
        let delivered = self.bus.publish(notification.event_id, &notification);
        if delivered == 0 {
            log::debug!("No handler registered for event {}", notification.event_id);
        }
        Routed::Published(delivered)
    }
}

/// Event dispatch engine
pub struct CoreEngine {
    router: Arc<Router>,
    inbox: mpsc::UnboundedSender<EngineEvent>,
    handle: JoinHandle<()>,
}

impl CoreEngine {
    /// Start the inbox task. The engine builds the REST gateway in front of
    /// `scheduler` so completions flow back into its own inbox.
    pub fn start(bus: Arc<EventBus>, scheduler: Arc<Scheduler>, config: &Config) -> Self {
        let (inbox, rx) = mpsc::unbounded_channel();
        let gateway = Arc::new(RestGateway::new(scheduler, inbox.clone(), config.api.clone()));
        let router = Arc::new(Router {
            bus,
            gateway,
            log_events: config.engine.log_events,
        });
        let handle = tokio::spawn(run_inbox(router.clone(), rx));

        Self { router, inbox, handle }
    }

    /// Queue an event for the engine task
    pub fn post(&self, event: EngineEvent) {
        if let Err(e) = self.inbox.send(event) {
            log::error!("Engine inbox closed, dropping event {}", e.0.id);
        }
    }

    /// Route an event on the caller's context
    pub fn dispatch_now(&self, event: EngineEvent) -> Routed {
        self.router.route(event)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.router.bus
    }

    pub fn gateway(&self) -> &Arc<RestGateway> {
        &self.router.gateway
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for CoreEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_inbox(router: Arc<Router>, mut rx: mpsc::UnboundedReceiver<EngineEvent>) {
    debug!("CoreEngine inbox started");
    while let Some(event) = rx.recv().await {
        router.route(event);
    }
    debug!("CoreEngine inbox closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventId, Lane, Payload, Response, ResultCode};
    use crate::events::NotificationBody;
    use crate::transport::MockTransport;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    fn engine() -> CoreEngine {
        let config = Config::default();
        let scheduler = Arc::new(Scheduler::start(
            config.scheduler.clone(),
            Arc::new(MockTransport::new()),
        ));
        CoreEngine::start(Arc::new(EventBus::new()), scheduler, &config)
    }

    fn recorder(engine: &CoreEngine, category: Category) -> Arc<Mutex<Vec<Notification>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        engine
            .bus()
            .subscribe(category, move |n| sink.lock().unwrap().push(n.clone()));
        seen
    }

    #[tokio::test]
    async fn test_dispatch_now_routes_by_category() {
        let engine = engine();
        let rest = recorder(&engine, Category::Rest);
        let socket = recorder(&engine, Category::Socket);

        let routed = engine.dispatch_now(EngineEvent::signal(3000, json!({"peer": "watch"})));
        assert_eq!(routed, Routed::Published(1));

        let routed = engine.dispatch_now(EngineEvent::completed(
            1000,
            ResultCode::Failure,
            Response::failure(500, "boom"),
        ));
        assert_eq!(routed, Routed::Published(1));

        assert_eq!(socket.lock().unwrap()[0].event_id, EventId(3000));
        let rest = rest.lock().unwrap();
        assert_eq!(rest[0].result, ResultCode::Failure);
        assert!(matches!(&rest[0].body, NotificationBody::Response(r) if r.status == 500));
    }

    #[tokio::test]
    async fn test_unrecognized_event_is_dropped() {
        let engine = engine();
        let rest = recorder(&engine, Category::Rest);

        assert_eq!(engine.dispatch_now(EngineEvent::signal(9999, json!({}))), Routed::Dropped);
        assert!(rest.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_for_unnamed_rest_event_is_dropped() {
        let engine = engine();
        let routed = engine.dispatch_now(EngineEvent::request(1500, Lane::Fast, Payload::new(json!({"user": "x"}))));
        assert_eq!(routed, Routed::Dropped);
        assert!(engine.gateway().scheduler().snapshot().is_idle());
    }

    #[tokio::test]
    async fn test_request_for_local_event_is_dropped() {
        let engine = engine();
        let routed = engine.dispatch_now(EngineEvent::request(2000, Lane::Fast, Payload::default()));
        assert_eq!(routed, Routed::Dropped);
        assert!(engine.gateway().scheduler().snapshot().is_idle());
    }

    #[tokio::test]
    async fn test_invalid_rest_request_is_dropped() {
        let engine = engine();
        let routed = engine.dispatch_now(EngineEvent::request(1000, Lane::Fast, Payload::new(json!(null))));
        assert_eq!(routed, Routed::Dropped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_posted_login_reaches_rest_subscribers() {
        let engine = engine();
        let rest = recorder(&engine, Category::Rest);

        engine.post(EngineEvent::request(1000, Lane::Fast, Payload::new(json!({"user": "x"}))));

        for _ in 0..100 {
            if !rest.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let rest = rest.lock().unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].event_id, EventId(1000));
        assert_eq!(rest[0].result, ResultCode::Success);
    }

    #[tokio::test]
    async fn test_shutdown_stops_inbox() {
        let engine = engine();
        engine.shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!engine.is_running());
    }
}
