//! Subscriber registry for live events.
//!
//! Handlers are called synchronously on the channel task, in registration
//! order, once per event. A [`Subscription`] removes its handler on
//! [`unsubscribe`](Subscription::unsubscribe) or when dropped.

use std::sync::{Arc, Mutex, Weak};

use crate::messages::LiveEvent;

/// Callback invoked for every decoded event.
pub type EventHandler = Arc<dyn Fn(&LiveEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    handlers: Vec<(u64, EventHandler)>,
}

impl SubscriberRegistry {
    pub(crate) fn add(self: &Arc<Self>, handler: EventHandler) -> Subscription {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.push((id, handler));
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) -> bool {
        let mut inner = self.lock();
        let before = inner.handlers.len();
        inner.handlers.retain(|(hid, _)| *hid != id);
        inner.handlers.len() != before
    }

    /// Deliver one event to every current subscriber.
    ///
    /// The handler list is snapshotted first so a handler may subscribe or
    /// unsubscribe without deadlocking.
    pub(crate) fn emit(&self, event: &LiveEvent) {
        let handlers: Vec<EventHandler> = self
            .lock()
            .handlers
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().handlers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        // A panicking handler must not wedge the whole channel.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle for one registered handler.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    /// Stop receiving events. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(self.id) {
                tracing::debug!(subscription_id = self.id, "Live subscriber removed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
