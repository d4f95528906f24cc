//! Subscriber lists for world-side cells.
//!
//! Attributes, objects and sources all notify interested expression leaves
//! through the same mechanism: a list of callbacks keyed by
//! [`SubscriberId`]. Subscribing hands back a [`Subscription`] guard and
//! dropping the guard removes the callback again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

type Notify = Box<dyn Fn() + Send + Sync>;
type Registry = RwLock<IndexMap<SubscriberId, Notify>>;

/// The callbacks registered on one world cell.
#[derive(Default)]
pub(crate) struct Subscribers {
    registry: Arc<Registry>,
}

impl Subscribers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `notify`. The callback stays registered until the returned
    /// guard is dropped.
    pub(crate) fn subscribe<F>(&self, notify: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        self.registry.write().insert(id, Box::new(notify));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Invoke every registered callback.
    pub(crate) fn notify_all(&self) {
        let registry = self.registry.read();
        for notify in registry.values() {
            notify();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.registry.read().len()
    }
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.len())
            .finish()
    }
}

/// Handle to a registered callback.
///
/// Dropping this handle unregisters the callback.
pub struct Subscription {
    id: SubscriberId,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.write().shift_remove(&self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscription").field(&self.id).finish()
    }
}
