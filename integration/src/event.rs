//! Copy-on-write callback registries standing in for multicast events.
//!
//! Publication takes a snapshot of the registered handlers under a dedicated
//! lock and invokes them outside it, so handlers may freely re-enter the hub
//! (including unsubscribing themselves).

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registration<T> {
    id: u64,
    handler: Handler<T>,
}

impl<T> Clone for Registration<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: Arc::clone(&self.handler),
        }
    }
}

/// Handle returned by [`EventHub::subscribe`]; pass back to
/// [`EventHub::unsubscribe`] to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubSubscription {
    id: u64,
}

/// Multicast event replacement: `(event) -> ()` callbacks registered through
/// a `subscribe -> HubSubscription` API.
pub struct EventHub<T> {
    registrations: Mutex<Arc<Vec<Registration<T>>>>,
    next_id: AtomicU64,
}

impl<T> Default for EventHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventHub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("handlers", &self.len())
            .finish()
    }
}

impl<T> EventHub<T> {
    pub fn new() -> Self {
        Self {
            registrations: Mutex::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> HubSubscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut registrations = self.registrations.lock();
        let mut next = Vec::with_capacity(registrations.len() + 1);
        next.extend(registrations.iter().cloned());
        next.push(Registration {
            id,
            handler: Arc::new(handler),
        });
        *registrations = Arc::new(next);

        HubSubscription { id }
    }

    pub fn unsubscribe(&self, subscription: HubSubscription) {
        let mut registrations = self.registrations.lock();
        let next = registrations
            .iter()
            .filter(|registration| registration.id != subscription.id)
            .cloned()
            .collect::<Vec<_>>();
        *registrations = Arc::new(next);
    }

    /// Invoke every registered handler with the event.
    ///
    /// Handlers run on the publishing task, outside the registry lock.
    pub fn publish(&self, event: &T) {
        let snapshot = Arc::clone(&self.registrations.lock());
        for registration in snapshot.iter() {
            (registration.handler)(event);
        }
    }

    pub fn len(&self) -> usize {
        self.registrations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_publish_reaches_all_handlers() {
        let hub = EventHub::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            hub.subscribe(move |event: &u32| {
                calls.fetch_add(*event as usize, Ordering::SeqCst);
            });
        }

        hub.publish(&2);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_unsubscribe_removes_only_target() {
        let hub = EventHub::<()>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_a = Arc::clone(&calls);
        let a = hub.subscribe(move |_| {
            calls_a.fetch_add(1, Ordering::SeqCst);
        });
        let calls_b = Arc::clone(&calls);
        let _b = hub.subscribe(move |_| {
            calls_b.fetch_add(10, Ordering::SeqCst);
        });

        hub.unsubscribe(a);
        hub.publish(&());

        assert_eq!(hub.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_handler_may_reenter_hub() {
        let hub = Arc::new(EventHub::<()>::new());

        let reentrant = Arc::clone(&hub);
        hub.subscribe(move |_| {
            // Registering during publication must not deadlock
            reentrant.subscribe(|_| {});
        });

        hub.publish(&());
        assert_eq!(hub.len(), 2);
    }
}
