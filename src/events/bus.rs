//! Event Bus - category-keyed publish/subscribe registry
//!
//! Handlers register under a category and get back a `Subscription` token;
//! the same token removes them. Publishing classifies the event id and
//! notifies every handler registered for that category.

use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::types::Notification;
use crate::domain::{Category, EventId};
use crate::error::RestlaneError;

/// Subscriber callback
pub type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Token returned by [`EventBus::subscribe`]; pass it back to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    category: Category,
    handle: u64,
}

impl Subscription {
    pub fn category(&self) -> Category {
        self.category
    }
}

/// Category-keyed handler registry
///
/// One lock guards the whole registry. `publish` copies the handler list out
/// under that lock and invokes the handlers after releasing it, so a handler
/// may subscribe or unsubscribe without deadlocking.
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<HashMap<Category, BTreeMap<u64, Handler>>>,
    next_handle: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<Category, BTreeMap<u64, Handler>>> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `handler` for every event in `category`
    pub fn subscribe<F>(&self, category: Category, handler: F) -> Subscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.registry()
            .entry(category)
            .or_default()
            .insert(handle, Arc::new(handler));
        debug!(category = %category, handle, "EventBus::subscribe");
        Subscription { category, handle }
    }

    /// Remove a handler. Returns false if it was already gone.
    ///
    /// A `publish` already running on another thread works from the handler
    /// list it copied before this call, so the removed handler may still
    /// receive that one notification. Every publish that starts after this
    /// returns skips it.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let removed = self
            .registry()
            .get_mut(&subscription.category)
            .and_then(|handlers| handlers.remove(&subscription.handle))
            .is_some();
        debug!(
            category = %subscription.category,
            handle = subscription.handle,
            removed,
            "EventBus::unsubscribe"
        );
        removed
    }

    /// Notify every handler of the event's category.
    ///
    /// Unrecognized ids are logged and dropped. Returns the number of
    /// handlers invoked.
    pub fn publish(&self, event_id: EventId, notification: &Notification) -> usize {
        let Some(category) = event_id.category() else {
            log::warn!("Dropping notification: {}", RestlaneError::UnrecognizedEvent(event_id.raw()));
            return 0;
        };

        let handlers: Vec<Handler> = self
            .registry()
            .get(&category)
            .map(|handlers| handlers.values().cloned().collect())
            .unwrap_or_default();

        for handler in &handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(notification))).is_err() {
                log::error!("Handler for {} event {} panicked", category, event_id);
            }
        }
        handlers.len()
    }

    pub fn handler_count(&self, category: Category) -> usize {
        self.registry().get(&category).map_or(0, BTreeMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Response, ResultCode};
    use serde_json::{Value, json};

    fn recorder(bus: &EventBus, category: Category) -> (Subscription, Arc<Mutex<Vec<Notification>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = bus.subscribe(category, move |n| sink.lock().unwrap().push(n.clone()));
        (sub, seen)
    }

    #[test]
    fn test_publish_reaches_only_matching_category() {
        let bus = EventBus::new();
        let (_rest, rest_seen) = recorder(&bus, Category::Rest);
        let (_local, local_seen) = recorder(&bus, Category::Local);

        let n = Notification::response(EventId(1000), ResultCode::Success, Response::ok(json!({})));
        assert_eq!(bus.publish(EventId(1000), &n), 1);

        assert_eq!(rest_seen.lock().unwrap().len(), 1);
        assert!(local_seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unrecognized_event_is_dropped() {
        let bus = EventBus::new();
        let (_sub, seen) = recorder(&bus, Category::Rest);

        let n = Notification::payload(EventId(9999), Value::Null);
        assert_eq!(bus.publish(EventId(9999), &n), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unsubscribe_by_token() {
        let bus = EventBus::new();
        let (sub, seen) = recorder(&bus, Category::Socket);
        assert_eq!(bus.handler_count(Category::Socket), 1);

        assert!(bus.unsubscribe(&sub));
        assert!(!bus.unsubscribe(&sub));
        assert_eq!(bus.handler_count(Category::Socket), 0);

        bus.publish(EventId(3000), &Notification::payload(EventId(3000), Value::Null));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_tokens_are_distinct_per_subscription() {
        let bus = EventBus::new();
        let a = bus.subscribe(Category::Rest, |_| {});
        let b = bus.subscribe(Category::Rest, |_| {});
        assert_ne!(a, b);
        assert_eq!(a.category(), Category::Rest);

        bus.unsubscribe(&a);
        assert_eq!(bus.handler_count(Category::Rest), 1);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let bus_ref = bus.clone();
        let slot_ref = slot.clone();
        let sub = bus.subscribe(Category::Local, move |_| {
            if let Some(sub) = slot_ref.lock().unwrap().take() {
                bus_ref.unsubscribe(&sub);
            }
        });
        *slot.lock().unwrap() = Some(sub);

        bus.publish(EventId(2000), &Notification::payload(EventId(2000), Value::Null));
        assert_eq!(bus.handler_count(Category::Local), 0);
    }

    #[test]
    fn test_unsubscribe_during_publish_takes_effect_on_next_publish() {
        let bus = Arc::new(EventBus::new());
        let (victim, seen) = recorder(&bus, Category::Rest);

        // Registered after the recorder, so it runs second within a publish.
        let bus_ref = bus.clone();
        let removed = Arc::new(Mutex::new(false));
        let removed_flag = removed.clone();
        bus.subscribe(Category::Rest, move |_| {
            *removed_flag.lock().unwrap() |= bus_ref.unsubscribe(&victim);
        });

        let n = Notification::progress(EventId(1000), 0.5, "pic.jpg");
        assert_eq!(bus.publish(EventId(1000), &n), 2);
        assert!(*removed.lock().unwrap());
        assert_eq!(seen.lock().unwrap().len(), 1);

        assert_eq!(bus.publish(EventId(1000), &n), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_others() {
        let bus = EventBus::new();
        bus.subscribe(Category::Rest, |_| panic!("handler bug"));
        let (_sub, seen) = recorder(&bus, Category::Rest);

        let n = Notification::progress(EventId(1000), 0.5, "pic.jpg");
        assert_eq!(bus.publish(EventId(1000), &n), 2);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
