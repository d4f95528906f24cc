//! Value Holders
//!
//! Every expression node owns exactly one [`ValueHolder`]. The holder is
//! mutated in place for the whole life of the node; parents read it through
//! the node's handle, so it is never swapped for a new cell.
//!
//! Values come in four flavours:
//!
//! - fuzzy degrees of truth ([`Fuzzy`])
//! - integers
//! - references to world objects (possibly none)
//! - sets of world objects
//!
//! Each holder additionally carries a `defined` flag. Links whose target
//! does not exist, divisions by zero and similar situations produce an
//! undefined value rather than an error.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::world::ObjectId;

/// A fuzzy degree of truth.
///
/// The full `i16` range is used: [`Fuzzy::FALSE`] is the minimum and
/// [`Fuzzy::TRUE`] the maximum. Conjunction is the minimum, disjunction the
/// maximum and negation the bitwise complement, which maps the two extremes
/// onto each other.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fuzzy(i16);

impl Fuzzy {
    pub const FALSE: Fuzzy = Fuzzy(i16::MIN);
    pub const TRUE: Fuzzy = Fuzzy(i16::MAX);

    pub const fn new(degree: i16) -> Self {
        Self(degree)
    }

    pub const fn from_bool(value: bool) -> Self {
        if value {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }

    /// Raw degree.
    pub const fn degree(self) -> i16 {
        self.0
    }

    /// `Some` only for the two crisp extremes.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::TRUE => Some(true),
            Self::FALSE => Some(false),
            _ => None,
        }
    }

    pub fn not(self) -> Self {
        Self(!self.0)
    }

    pub fn and(self, other: Self) -> Self {
        self.min(other)
    }

    pub fn or(self, other: Self) -> Self {
        self.max(other)
    }
}

impl fmt::Debug for Fuzzy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_bool() {
            Some(true) => f.write_str("True"),
            Some(false) => f.write_str("False"),
            None => write!(f, "Fuzzy({})", self.0),
        }
    }
}

impl From<bool> for Fuzzy {
    fn from(value: bool) -> Self {
        Self::from_bool(value)
    }
}

/// The type of a value, used for operator signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Fuzzy,
    Integer,
    Object,
    Set,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Fuzzy => "fuzzy",
            ValueType::Integer => "integer",
            ValueType::Object => "object",
            ValueType::Set => "set",
        };
        f.write_str(name)
    }
}

/// A typed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Fuzzy(Fuzzy),
    Int(i64),
    Object(Option<ObjectId>),
    Set(BTreeSet<ObjectId>),
}

impl Value {
    /// The neutral value of a type, used while a holder is undefined.
    pub fn default_of(ty: ValueType) -> Self {
        match ty {
            ValueType::Fuzzy => Value::Fuzzy(Fuzzy::FALSE),
            ValueType::Integer => Value::Int(0),
            ValueType::Object => Value::Object(None),
            ValueType::Set => Value::Set(BTreeSet::new()),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Fuzzy(_) => ValueType::Fuzzy,
            Value::Int(_) => ValueType::Integer,
            Value::Object(_) => ValueType::Object,
            Value::Set(_) => ValueType::Set,
        }
    }
}

/// The mutable, typed cell owned by an expression node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueHolder {
    value: Value,
    defined: bool,
}

impl ValueHolder {
    pub fn defined(value: Value) -> Self {
        Self {
            value,
            defined: true,
        }
    }

    pub fn undefined(ty: ValueType) -> Self {
        Self {
            value: Value::default_of(ty),
            defined: false,
        }
    }

    pub fn fuzzy(value: Fuzzy) -> Self {
        Self::defined(Value::Fuzzy(value))
    }

    pub fn int(value: i64) -> Self {
        Self::defined(Value::Int(value))
    }

    pub fn is_defined(&self) -> bool {
        self.defined
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }

    pub fn as_fuzzy(&self) -> Option<Fuzzy> {
        match (&self.value, self.defined) {
            (Value::Fuzzy(f), true) => Some(*f),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match (&self.value, self.defined) {
            (Value::Int(i), true) => Some(*i),
            _ => None,
        }
    }

    /// The referenced object. `None` both when undefined and when the
    /// reference is empty.
    pub fn as_object(&self) -> Option<ObjectId> {
        match (&self.value, self.defined) {
            (Value::Object(o), true) => *o,
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<ObjectId>> {
        match (&self.value, self.defined) {
            (Value::Set(s), true) => Some(s),
            _ => None,
        }
    }

    /// Overwrite the holder in place. Returns whether the observable value
    /// changed: the defined flag flipped, or the holder is defined and the
    /// value differs. The type of an undefined replacement is kept.
    pub fn assign(&mut self, next: ValueHolder) -> bool {
        let changed = self.defined != next.defined || (next.defined && self.value != next.value);
        if next.defined || self.value.value_type() == next.value.value_type() {
            self.value = next.value;
        }
        self.defined = next.defined;
        changed
    }
}
