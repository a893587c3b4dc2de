//! Typed publish/subscribe event bus
//!
//! Replaces string-keyed listener lookup with a closed set of event-kind
//! tags: every event type is a tagged union whose [`BusEvent::kind`]
//! drives dispatch. Subscribers register per kind and are invoked exactly
//! once per emission, in subscription order; emitting one kind never
//! reaches another kind's subscribers.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An event that can be published on an [`EventBus`].
pub trait BusEvent: Clone + Send + Sync + 'static {
    /// Closed set of kind tags for this event family.
    type Kind: Copy + PartialEq + Send + Sync + 'static;

    /// Returns the kind tag used for dispatch.
    fn kind(&self) -> Self::Kind;
}

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Subscriber<E: BusEvent> {
    id: u64,
    kind: E::Kind,
    callback: Callback<E>,
}

/// In-process fan-out from one entity to its subscribers.
pub struct EventBus<E: BusEvent> {
    subscribers: RwLock<Vec<Subscriber<E>>>,
    next_id: AtomicU64,
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> EventBus<E> {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Subscribes to one event kind.
    pub fn on<F>(&self, kind: E::Kind, callback: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.write().push(Subscriber {
            id,
            kind,
            callback: Arc::new(callback),
        });
        SubscriptionId(id)
    }

    /// Removes one subscription. Returns false if it was already gone.
    pub fn off(&self, subscription: SubscriptionId) -> bool {
        let mut subs = self.subscribers.write();
        let before = subs.len();
        subs.retain(|s| s.id != subscription.0);
        subs.len() != before
    }

    /// Removes every subscription on this bus.
    pub fn remove_all_listeners(&self) {
        self.subscribers.write().clear();
    }

    /// Number of subscribers registered for the given kind.
    pub fn subscriber_count(&self, kind: E::Kind) -> usize {
        self.subscribers.read().iter().filter(|s| s.kind == kind).count()
    }

    /// Notifies every subscriber of the event's kind, in subscription
    /// order. Callbacks run outside the registry lock so a subscriber may
    /// re-enter the bus.
    pub fn emit(&self, event: &E) {
        let matching: Vec<Callback<E>> = {
            let subs = self.subscribers.read();
            subs.iter()
                .filter(|s| s.kind == event.kind())
                .map(|s| s.callback.clone())
                .collect()
        };
        for callback in matching {
            callback(event);
        }
    }
}

impl<E: BusEvent> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.read().len())
            .finish()
    }
}
