//! World objects, sources and substitutions.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::attribute::Attribute;
use super::subscriber::{Subscribers, Subscription};
use crate::value::Value;

macro_rules! world_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            fn next() -> Self {
                static COUNTER: AtomicU64 = AtomicU64::new(0);
                Self(COUNTER.fetch_add(1, Ordering::Relaxed))
            }

            pub fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

world_id!(
    /// Identity of a world object.
    ObjectId
);
world_id!(
    /// Identity of a source slot.
    SourceId
);
world_id!(SensorId);

struct ObjectCell {
    name: String,
    attributes: RwLock<IndexMap<String, Attribute>>,
    subscribers: Subscribers,
}

/// An object of the simulated world: a name plus a set of attributes.
///
/// Subscribers are notified when attributes are added or removed, not when
/// an attribute value changes; those notifications come from the attribute
/// itself.
#[derive(Clone)]
pub struct WorldObject {
    id: ObjectId,
    cell: Arc<ObjectCell>,
}

impl WorldObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ObjectId::next(),
            cell: Arc::new(ObjectCell {
                name: name.into(),
                attributes: RwLock::new(IndexMap::new()),
                subscribers: Subscribers::new(),
            }),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.cell.name
    }

    pub fn attribute(&self, name: &str) -> Option<Attribute> {
        self.cell.attributes.read().get(name).cloned()
    }

    /// Add an attribute, or overwrite the value of an existing one.
    pub fn set_attribute(&self, name: impl Into<String>, value: Value) -> Attribute {
        let name = name.into();
        if let Some(existing) = self.attribute(&name) {
            existing.set(value);
            return existing;
        }
        let attribute = Attribute::new(value);
        self.cell
            .attributes
            .write()
            .insert(name, attribute.clone());
        self.cell.subscribers.notify_all();
        attribute
    }

    pub fn remove_attribute(&self, name: &str) -> Option<Attribute> {
        let removed = self.cell.attributes.write().shift_remove(name);
        if removed.is_some() {
            self.cell.subscribers.notify_all();
        }
        removed
    }

    pub fn subscribe<F>(&self, notify: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.cell.subscribers.subscribe(notify)
    }
}

impl fmt::Debug for WorldObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldObject")
            .field("id", &self.id)
            .field("name", &self.cell.name)
            .finish()
    }
}

struct SourceCell {
    object: RwLock<Option<WorldObject>>,
    subscribers: Subscribers,
}

/// A slot that refers to (at most) one world object.
///
/// Link leaves are bound to sources rather than to objects, so a source
/// that is re-pointed at another object re-targets every leaf bound to it.
/// Two leaves bound to the same source are interchangeable; leaves bound to
/// different sources never are, whatever those sources currently hold.
#[derive(Clone)]
pub struct Source {
    id: SourceId,
    cell: Arc<SourceCell>,
}

impl Source {
    pub fn new(object: Option<WorldObject>) -> Self {
        Self {
            id: SourceId::next(),
            cell: Arc::new(SourceCell {
                object: RwLock::new(object),
                subscribers: Subscribers::new(),
            }),
        }
    }

    pub fn of(object: &WorldObject) -> Self {
        Self::new(Some(object.clone()))
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn object(&self) -> Option<WorldObject> {
        self.cell.object.read().clone()
    }

    /// Point the source at another object (or none) and notify subscribers.
    pub fn set_object(&self, object: Option<WorldObject>) {
        *self.cell.object.write() = object;
        self.cell.subscribers.notify_all();
    }

    pub fn subscribe<F>(&self, notify: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.cell.subscribers.subscribe(notify)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("object", &self.object().map(|o| o.id()))
            .finish()
    }
}

/// Role name to source mapping used to instantiate expression trees.
#[derive(Debug, Clone, Default)]
pub struct Substitution {
    roles: IndexMap<String, Source>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style binding of `role` to `source`.
    pub fn with(mut self, role: impl Into<String>, source: Source) -> Self {
        self.bind(role, source);
        self
    }

    pub fn bind(&mut self, role: impl Into<String>, source: Source) {
        self.roles.insert(role.into(), source);
    }

    pub fn source(&self, role: &str) -> Option<&Source> {
        self.roles.get(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }
}

/// A perception channel handed to expressions through `change_sensors`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sensor {
    id: SensorId,
    name: String,
}

impl Sensor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: SensorId::next(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> SensorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn set_attribute_reuses_existing_cell() {
        let actor = WorldObject::new("actor");
        let first = actor.set_attribute("x", Value::Int(1));
        let second = actor.set_attribute("x", Value::Int(2));

        assert_eq!(first.id(), second.id());
        assert_eq!(first.get(), Value::Int(2));
    }

    #[test]
    fn object_notifies_on_structure_change() {
        let actor = WorldObject::new("actor");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _sub = actor.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        actor.set_attribute("x", Value::Int(1));
        actor.set_attribute("x", Value::Int(2));
        actor.remove_attribute("x");
        actor.remove_attribute("x");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn source_retargets() {
        let a = WorldObject::new("a");
        let b = WorldObject::new("b");
        let source = Source::of(&a);

        source.set_object(Some(b.clone()));
        assert_eq!(source.object().map(|o| o.id()), Some(b.id()));

        source.set_object(None);
        assert!(source.object().is_none());
    }

    #[test]
    fn substitution_resolves_roles() {
        let source = Source::new(None);
        let subst = Substitution::new().with("actor", source.clone());

        assert_eq!(subst.source("actor").map(Source::id), Some(source.id()));
        assert!(subst.source("target").is_none());
        assert_eq!(subst.roles().collect::<Vec<_>>(), vec!["actor"]);
    }
}
