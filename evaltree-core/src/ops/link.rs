//! Link leaves
//!
//! Links are the only leaves that read the world. A link names a role and
//! (except for the source-emptiness check) an attribute; instantiating it
//! resolves the role through a [`Substitution`] and subscribes to the source,
//! the object it currently points at, and the attribute itself. Any of those
//! changing posts the leaf into its arena's signal inbox.
//!
//! Content equality of links is decided by [`Binding`]: two bound links are
//! interchangeable only when they read the same source.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::warn;

use crate::graph::Notifier;
use crate::value::{Fuzzy, Value, ValueHolder, ValueType};
use crate::world::{Attribute, Source, SourceId, Substitution, Subscription, WorldObject};

/// What a link reads and how it converts the attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    Int,
    Fuzzy,
    Object,
    /// TRUE when the object attribute refers to something.
    BoolObject,
    Set,
}

impl LinkKind {
    pub fn name(self) -> &'static str {
        match self {
            LinkKind::Int => "intlink",
            LinkKind::Fuzzy => "fuzzylink",
            LinkKind::Object => "objectlink",
            LinkKind::BoolObject => "boolobjectlink",
            LinkKind::Set => "setlink",
        }
    }

    pub fn result_type(self) -> ValueType {
        match self {
            LinkKind::Int => ValueType::Integer,
            LinkKind::Fuzzy | LinkKind::BoolObject => ValueType::Fuzzy,
            LinkKind::Object => ValueType::Object,
            LinkKind::Set => ValueType::Set,
        }
    }

    /// Convert a raw attribute value. A value of the wrong type reads as
    /// undefined, as does an empty object reference for object links.
    fn convert(self, value: &Value) -> ValueHolder {
        match (self, value) {
            (LinkKind::Int, Value::Int(i)) => ValueHolder::int(*i),
            (LinkKind::Fuzzy, Value::Fuzzy(f)) => ValueHolder::fuzzy(*f),
            (LinkKind::Object, Value::Object(Some(o))) => ValueHolder::defined(Value::Object(Some(*o))),
            (LinkKind::BoolObject, Value::Object(o)) => {
                ValueHolder::fuzzy(Fuzzy::from_bool(o.is_some()))
            }
            (LinkKind::Set, Value::Set(s)) => ValueHolder::defined(Value::Set(s.clone())),
            _ => ValueHolder::undefined(self.result_type()),
        }
    }
}

/// The identity a link contributes to content equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Binding {
    /// Bound to this source.
    Bound(SourceId),
    /// Not bound; carries the role name.
    Unbound(Arc<str>),
}

struct BoundLink {
    source: Source,
    object: Option<WorldObject>,
    attr: Option<Attribute>,
    notifier: Notifier,
    watches: SmallVec<[Subscription; 3]>,
}

impl BoundLink {
    fn watch(&mut self) {
        self.watches.clear();
        let n = self.notifier.clone();
        self.watches.push(self.source.subscribe(move || n.notify()));
        if let Some(object) = &self.object {
            let n = self.notifier.clone();
            self.watches.push(object.subscribe(move || n.notify()));
        }
        if let Some(attr) = &self.attr {
            let n = self.notifier.clone();
            self.watches.push(attr.subscribe(move || n.notify()));
        }
    }
}

/// A leaf reading one attribute of the object in a role.
pub struct LinkNode {
    kind: LinkKind,
    role: Arc<str>,
    attribute: Arc<str>,
    bound: Option<BoundLink>,
}

impl LinkNode {
    pub fn new(kind: LinkKind, role: impl Into<Arc<str>>, attribute: impl Into<Arc<str>>) -> Self {
        Self {
            kind,
            role: role.into(),
            attribute: attribute.into(),
            bound: None,
        }
    }

    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    pub fn binding(&self) -> Binding {
        match &self.bound {
            Some(bound) => Binding::Bound(bound.source.id()),
            None => Binding::Unbound(self.role.clone()),
        }
    }

    /// A fresh, unbound link with the same kind, role and attribute.
    pub fn unbound_copy(&self) -> Self {
        Self::new(self.kind, self.role.clone(), self.attribute.clone())
    }

    /// Resolve the role and start watching the source, object and attribute.
    pub(crate) fn bind(&mut self, subst: &Substitution, notifier: Notifier) {
        self.bound = None;
        let Some(source) = subst.source(&self.role) else {
            warn!(role = %self.role, "no source for role");
            return;
        };
        let mut bound = BoundLink {
            source: source.clone(),
            object: None,
            attr: None,
            notifier,
            watches: SmallVec::new(),
        };
        self.resolve_into(&mut bound);
        bound.watch();
        self.bound = Some(bound);
    }

    pub(crate) fn unbind(&mut self) {
        self.bound = None;
    }

    /// Follow the source again after a notification. Watches are moved when
    /// the object or the attribute behind the source is a different one.
    pub(crate) fn resolve(&mut self) {
        let Some(mut bound) = self.bound.take() else {
            return;
        };
        let before = (
            bound.object.as_ref().map(WorldObject::id),
            bound.attr.as_ref().map(Attribute::id),
        );
        self.resolve_into(&mut bound);
        let after = (
            bound.object.as_ref().map(WorldObject::id),
            bound.attr.as_ref().map(Attribute::id),
        );
        if before != after {
            bound.watch();
        }
        self.bound = Some(bound);
    }

    fn resolve_into(&self, bound: &mut BoundLink) {
        bound.object = bound.source.object();
        bound.attr = bound.object.as_ref().and_then(|object| {
            let attr = object.attribute(&self.attribute);
            if attr.is_none() {
                warn!(
                    object = object.name(),
                    role = %self.role,
                    attribute = %self.attribute,
                    "object does not contain attribute"
                );
            }
            attr
        });
    }

    /// Current value seen through the binding.
    pub fn read(&self) -> ValueHolder {
        match self.bound.as_ref().and_then(|b| b.attr.as_ref()) {
            Some(attr) => attr.with(|value| self.kind.convert(value)),
            None => ValueHolder::undefined(self.kind.result_type()),
        }
    }

    /// One-off read through `subst` without binding or subscribing.
    pub fn read_once(&self, subst: &Substitution) -> ValueHolder {
        subst
            .source(&self.role)
            .and_then(Source::object)
            .and_then(|object| object.attribute(&self.attribute))
            .map(|attr| attr.with(|value| self.kind.convert(value)))
            .unwrap_or_else(|| ValueHolder::undefined(self.kind.result_type()))
    }

    pub fn info_arguments(&self) -> String {
        format!("{}.{}", self.role, self.attribute)
    }
}

impl std::fmt::Debug for LinkNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkNode")
            .field("kind", &self.kind)
            .field("role", &self.role)
            .field("attribute", &self.attribute)
            .field("binding", &self.binding())
            .finish()
    }
}

/// A fuzzy leaf that is TRUE while the source in a role points at nothing.
pub struct SourceLink {
    role: Arc<str>,
    bound: Option<(Source, Subscription)>,
}

impl SourceLink {
    pub fn new(role: impl Into<Arc<str>>) -> Self {
        Self {
            role: role.into(),
            bound: None,
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    pub fn binding(&self) -> Binding {
        match &self.bound {
            Some((source, _)) => Binding::Bound(source.id()),
            None => Binding::Unbound(self.role.clone()),
        }
    }

    pub fn unbound_copy(&self) -> Self {
        Self::new(self.role.clone())
    }

    pub(crate) fn bind(&mut self, subst: &Substitution, notifier: Notifier) {
        self.bound = None;
        match subst.source(&self.role) {
            Some(source) => {
                let watch = source.subscribe(move || notifier.notify());
                self.bound = Some((source.clone(), watch));
            }
            None => warn!(role = %self.role, "no source for role"),
        }
    }

    pub(crate) fn unbind(&mut self) {
        self.bound = None;
    }

    pub fn read(&self) -> ValueHolder {
        match &self.bound {
            Some((source, _)) => Self::emptiness(source),
            None => ValueHolder::undefined(ValueType::Fuzzy),
        }
    }

    pub fn read_once(&self, subst: &Substitution) -> ValueHolder {
        match subst.source(&self.role) {
            Some(source) => Self::emptiness(source),
            None => {
                warn!(role = %self.role, "no source for role");
                ValueHolder::undefined(ValueType::Fuzzy)
            }
        }
    }

    fn emptiness(source: &Source) -> ValueHolder {
        ValueHolder::fuzzy(Fuzzy::from_bool(source.object().is_none()))
    }
}

impl std::fmt::Debug for SourceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceLink")
            .field("role", &self.role)
            .field("binding", &self.binding())
            .finish()
    }
}
