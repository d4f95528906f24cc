//! Attributes
//!
//! An attribute is a named, typed value stored on a world object. Link
//! leaves of expression trees read attributes and subscribe to them, so an
//! attribute write is the usual origin of a change that the DAG later
//! propagates.
//!
//! Attributes are cheap handles: clones share the same cell and the same
//! identity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::subscriber::{Subscribers, Subscription};
use crate::value::Value;

/// Unique identifier for an attribute cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeId(u64);

impl AttributeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

struct AttributeCell {
    value: RwLock<Value>,
    subscribers: Subscribers,
}

/// A shared, observable attribute value.
#[derive(Clone)]
pub struct Attribute {
    id: AttributeId,
    cell: Arc<AttributeCell>,
}

impl Attribute {
    pub fn new(value: Value) -> Self {
        Self {
            id: AttributeId::next(),
            cell: Arc::new(AttributeCell {
                value: RwLock::new(value),
                subscribers: Subscribers::new(),
            }),
        }
    }

    pub fn id(&self) -> AttributeId {
        self.id
    }

    /// Get a copy of the current value.
    pub fn get(&self) -> Value {
        self.cell.value.read().clone()
    }

    /// Read the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.cell.value.read())
    }

    /// Store a new value and notify subscribers if it differs from the old
    /// one. Returns whether the value changed.
    pub fn set(&self, value: Value) -> bool {
        {
            let mut guard = self.cell.value.write();
            if *guard == value {
                return false;
            }
            *guard = value;
        }
        self.cell.subscribers.notify_all();
        true
    }

    /// Register a callback invoked after every effective change.
    pub fn subscribe<F>(&self, notify: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.cell.subscribers.subscribe(notify)
    }

    pub fn subscriber_count(&self) -> usize {
        self.cell.subscribers.len()
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("id", &self.id)
            .field("value", &*self.cell.value.read())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
