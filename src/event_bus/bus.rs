//! In-process, synchronous-dispatch pub/sub for [`Event`]s.
//!
//! Subscriber list changes are consulted under a lock, but handler
//! invocation happens outside the lock: each `emit` snapshots the current
//! subscriber list before dispatching, so subscribe/unsubscribe calls made
//! from within a handler only affect *subsequent* emits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::event::Event;

/// Handle returned by [`EventBus::on`], used to unsubscribe via [`EventBus::off`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    /// `None` subscribes to every event kind; `Some(kind)` filters by
    /// [`Event::kind_str`].
    kind_filter: Option<&'static str>,
    handler: Arc<dyn Fn(&Event) + Send + Sync>,
}

/// Synchronous, registration-ordered pub/sub bus.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event.
    pub fn on_all(&self, handler: impl Fn(&Event) + Send + Sync + 'static) -> SubscriptionId {
        self.subscribe(None, handler)
    }

    /// Subscribe to events of one kind (see [`Event::kind_str`]).
    pub fn on(
        &self,
        kind: &'static str,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(Some(kind), handler)
    }

    fn subscribe(
        &self,
        kind_filter: Option<&'static str>,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push(Subscriber {
            id,
            kind_filter,
            handler: Arc::new(handler),
        });
        id
    }

    /// Unsubscribe. Returns `true` if a subscription with this id existed.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Dispatch `event` to every current subscriber, in registration order.
    /// A handler that panics is caught and logged; it never aborts the emit
    /// or affects other subscribers.
    pub fn emit(&self, event: Event) {
        let snapshot: Vec<Arc<dyn Fn(&Event) + Send + Sync>> = {
            let subs = self.subscribers.lock();
            subs.iter()
                .filter(|s| s.kind_filter.is_none_or(|k| k == event.kind_str()))
                .map(|s| s.handler.clone())
                .collect()
        };

        for handler in snapshot {
            let event_ref = &event;
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler(event_ref);
            }));
            if let Err(panic) = outcome {
                let message = panic_message(&panic);
                tracing::warn!(kind = event.kind_str(), error = %message, "event subscriber panicked");
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
