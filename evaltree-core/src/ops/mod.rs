//! Operators
//!
//! The node kinds are a closed set. Every node carries one [`Op`]: a
//! constant, a link into the world, or an operator over its children's
//! values. Operators are pure; [`Op::evaluate`] receives the children's
//! holders and returns the new holder for the node.
//!
//! Undefined inputs make the result undefined, except for the fuzzy
//! connectives: `and` is FALSE as soon as one defined input is FALSE, and
//! `or` is TRUE as soon as one defined input is TRUE. `defined` is always
//! defined itself. Integer overflow and division by zero yield undefined.

pub mod link;
pub mod signature;

use std::collections::BTreeSet;

use smallvec::{smallvec, SmallVec};

use crate::error::{EvalError, Result};
use crate::value::{Fuzzy, Value, ValueHolder, ValueType};
use crate::world::ObjectId;

use link::{LinkNode, SourceLink};

/// Operators with one child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    Abs,
    /// TRUE when the child (of the given type) is defined.
    Defined(ValueType),
    SetEmpty,
    SetNotEmpty,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Not => "not",
            UnaryOp::Neg => "neg",
            UnaryOp::Abs => "abs",
            UnaryOp::Defined(_) => "defined",
            UnaryOp::SetEmpty => "empty",
            UnaryOp::SetNotEmpty => "notempty",
        }
    }

    pub fn param(self) -> ValueType {
        match self {
            UnaryOp::Not => ValueType::Fuzzy,
            UnaryOp::Neg | UnaryOp::Abs => ValueType::Integer,
            UnaryOp::Defined(ty) => ty,
            UnaryOp::SetEmpty | UnaryOp::SetNotEmpty => ValueType::Set,
        }
    }

    pub fn result_type(self) -> ValueType {
        match self {
            UnaryOp::Neg | UnaryOp::Abs => ValueType::Integer,
            _ => ValueType::Fuzzy,
        }
    }

    fn evaluate(self, child: &ValueHolder) -> ValueHolder {
        if let UnaryOp::Defined(_) = self {
            return ValueHolder::fuzzy(Fuzzy::from_bool(child.is_defined()));
        }
        let result = match self {
            UnaryOp::Not => child.as_fuzzy().map(|f| Value::Fuzzy(f.not())),
            UnaryOp::Neg => child.as_int().and_then(i64::checked_neg).map(Value::Int),
            UnaryOp::Abs => child.as_int().and_then(i64::checked_abs).map(Value::Int),
            UnaryOp::SetEmpty => child
                .as_set()
                .map(|s| Value::Fuzzy(Fuzzy::from_bool(s.is_empty()))),
            UnaryOp::SetNotEmpty => child
                .as_set()
                .map(|s| Value::Fuzzy(Fuzzy::from_bool(!s.is_empty()))),
            UnaryOp::Defined(_) => None,
        };
        defined_or(result, self.result_type())
    }
}

/// Operators with two children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    And,
    Or,
    FuzzyEq,
    FuzzyNotEq,
    FuzzyLt,
    FuzzyGt,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    IntEq,
    IntNotEq,
    IntLt,
    IntGt,
    ObjectEq,
    Union,
    Intersection,
    Difference,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::FuzzyEq | BinaryOp::IntEq | BinaryOp::ObjectEq => "eq",
            BinaryOp::FuzzyNotEq | BinaryOp::IntNotEq => "noteq",
            BinaryOp::FuzzyLt | BinaryOp::IntLt => "lt",
            BinaryOp::FuzzyGt | BinaryOp::IntGt => "gt",
            BinaryOp::Add => "add",
            BinaryOp::Sub | BinaryOp::Difference => "sub",
            BinaryOp::Mul => "mult",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::Union => "union",
            BinaryOp::Intersection => "intersection",
        }
    }

    pub fn param(self) -> ValueType {
        use BinaryOp::*;
        match self {
            And | Or | FuzzyEq | FuzzyNotEq | FuzzyLt | FuzzyGt => ValueType::Fuzzy,
            Add | Sub | Mul | Div | Mod | IntEq | IntNotEq | IntLt | IntGt => ValueType::Integer,
            ObjectEq => ValueType::Object,
            Union | Intersection | Difference => ValueType::Set,
        }
    }

    pub fn result_type(self) -> ValueType {
        use BinaryOp::*;
        match self {
            Add | Sub | Mul | Div | Mod => ValueType::Integer,
            Union | Intersection | Difference => ValueType::Set,
            _ => ValueType::Fuzzy,
        }
    }

    fn evaluate(self, a: &ValueHolder, b: &ValueHolder) -> ValueHolder {
        use BinaryOp::*;
        match self {
            And => fuzzy_fold([a, b], Fuzzy::FALSE, Fuzzy::and),
            Or => fuzzy_fold([a, b], Fuzzy::TRUE, Fuzzy::or),
            FuzzyEq | FuzzyNotEq | FuzzyLt | FuzzyGt => {
                let result = a.as_fuzzy().zip(b.as_fuzzy()).map(|(x, y)| match self {
                    FuzzyEq => x == y,
                    FuzzyNotEq => x != y,
                    FuzzyLt => x < y,
                    _ => x > y,
                });
                defined_or(result.map(truth), ValueType::Fuzzy)
            }
            Add | Sub | Mul | Div | Mod => {
                let result = a.as_int().zip(b.as_int()).and_then(|(x, y)| match self {
                    Add => x.checked_add(y),
                    Sub => x.checked_sub(y),
                    Mul => x.checked_mul(y),
                    Div => x.checked_div(y),
                    _ => x.checked_rem(y),
                });
                defined_or(result.map(Value::Int), ValueType::Integer)
            }
            IntEq | IntNotEq | IntLt | IntGt => {
                let result = a.as_int().zip(b.as_int()).map(|(x, y)| match self {
                    IntEq => x == y,
                    IntNotEq => x != y,
                    IntLt => x < y,
                    _ => x > y,
                });
                defined_or(result.map(truth), ValueType::Fuzzy)
            }
            ObjectEq => {
                let result = (a.is_defined() && b.is_defined())
                    .then(|| truth(a.value() == b.value()));
                defined_or(result, ValueType::Fuzzy)
            }
            Union | Intersection | Difference => {
                let result = a.as_set().zip(b.as_set()).map(|(x, y)| {
                    let set: BTreeSet<ObjectId> = match self {
                        Union => x.union(y).copied().collect(),
                        Intersection => x.intersection(y).copied().collect(),
                        _ => x.difference(y).copied().collect(),
                    };
                    Value::Set(set)
                });
                defined_or(result, ValueType::Set)
            }
        }
    }
}

/// Variable-arity fuzzy connectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MultiOp {
    And,
    Or,
}

impl MultiOp {
    pub fn name(self) -> &'static str {
        match self {
            MultiOp::And => "multiand",
            MultiOp::Or => "multior",
        }
    }

    fn evaluate(self, children: &[&ValueHolder]) -> ValueHolder {
        match self {
            MultiOp::And => fuzzy_fold(children.iter().copied(), Fuzzy::FALSE, Fuzzy::and),
            MultiOp::Or => fuzzy_fold(children.iter().copied(), Fuzzy::TRUE, Fuzzy::or),
        }
    }
}

/// The kind of a node together with its parameters.
#[derive(Debug)]
pub enum Op {
    FuzzyConst(Fuzzy),
    IntConst(i64),
    Link(LinkNode),
    EmptySource(SourceLink),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Multi(MultiOp),
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::FuzzyConst(_) => "fuzzy",
            Op::IntConst(_) => "int",
            Op::Link(link) => link.kind().name(),
            Op::EmptySource(_) => "emptysource",
            Op::Unary(op) => op.name(),
            Op::Binary(op) => op.name(),
            Op::Multi(op) => op.name(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Op::FuzzyConst(_) | Op::IntConst(_) | Op::Link(_) | Op::EmptySource(_)
        )
    }

    pub fn is_link(&self) -> bool {
        matches!(self, Op::Link(_) | Op::EmptySource(_))
    }

    pub fn result_type(&self) -> ValueType {
        match self {
            Op::FuzzyConst(_) | Op::EmptySource(_) | Op::Multi(_) => ValueType::Fuzzy,
            Op::IntConst(_) => ValueType::Integer,
            Op::Link(link) => link.kind().result_type(),
            Op::Unary(op) => op.result_type(),
            Op::Binary(op) => op.result_type(),
        }
    }

    /// Verify child count and child types for this operator.
    pub fn check_children(&self, types: &[ValueType]) -> Result<()> {
        let params: SmallVec<[ValueType; 2]> = match self {
            Op::Unary(op) => smallvec![op.param()],
            Op::Binary(op) => smallvec![op.param(), op.param()],
            Op::Multi(_) => {
                if types.is_empty() {
                    return Err(EvalError::ArityMismatch {
                        op: self.name(),
                        expected: "at least 1".into(),
                        actual: 0,
                    });
                }
                return check_types(self.name(), types, |_| ValueType::Fuzzy);
            }
            _ => SmallVec::new(),
        };
        if params.len() != types.len() {
            return Err(EvalError::ArityMismatch {
                op: self.name(),
                expected: params.len().to_string(),
                actual: types.len(),
            });
        }
        check_types(self.name(), types, |i| params[i])
    }

    /// Value of a leaf as seen right now. Operators return undefined here;
    /// they are computed through [`Op::evaluate`].
    pub fn leaf_value(&self) -> ValueHolder {
        match self {
            Op::FuzzyConst(f) => ValueHolder::fuzzy(*f),
            Op::IntConst(i) => ValueHolder::int(*i),
            Op::Link(link) => link.read(),
            Op::EmptySource(leaf) => leaf.read(),
            _ => ValueHolder::undefined(self.result_type()),
        }
    }

    /// Compute the value of an operator node from its children's values.
    /// Leaves ignore `children` and report their current value.
    pub fn evaluate(&self, children: &[&ValueHolder]) -> ValueHolder {
        match (self, children) {
            (Op::Unary(op), [a]) => op.evaluate(a),
            (Op::Binary(op), [a, b]) => op.evaluate(a, b),
            (Op::Multi(op), _) => op.evaluate(children),
            (Op::Unary(_) | Op::Binary(_), _) => ValueHolder::undefined(self.result_type()),
            _ => self.leaf_value(),
        }
    }

    /// Same kind and parameters, with any world binding dropped.
    pub fn template_copy(&self) -> Op {
        match self {
            Op::FuzzyConst(f) => Op::FuzzyConst(*f),
            Op::IntConst(i) => Op::IntConst(*i),
            Op::Link(link) => Op::Link(link.unbound_copy()),
            Op::EmptySource(leaf) => Op::EmptySource(leaf.unbound_copy()),
            Op::Unary(op) => Op::Unary(*op),
            Op::Binary(op) => Op::Binary(*op),
            Op::Multi(op) => Op::Multi(*op),
        }
    }

    /// Arguments shown in debug labels.
    pub fn info_arguments(&self) -> String {
        match self {
            Op::FuzzyConst(f) => format!("{:?}", f),
            Op::IntConst(i) => i.to_string(),
            Op::Link(link) => link.info_arguments(),
            Op::EmptySource(leaf) => leaf.role().to_string(),
            Op::Unary(UnaryOp::Defined(ty)) => ty.to_string(),
            _ => String::new(),
        }
    }
}

fn check_types(op: &'static str, types: &[ValueType], param: impl Fn(usize) -> ValueType) -> Result<()> {
    for (index, &actual) in types.iter().enumerate() {
        let expected = param(index);
        if actual != expected {
            return Err(EvalError::TypeMismatch {
                op,
                index,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

fn truth(value: bool) -> Value {
    Value::Fuzzy(Fuzzy::from_bool(value))
}

fn defined_or(value: Option<Value>, ty: ValueType) -> ValueHolder {
    match value {
        Some(value) => ValueHolder::defined(value),
        None => ValueHolder::undefined(ty),
    }
}

/// Fold fuzzy inputs with `combine`. A defined `dominant` input decides the
/// result even when other inputs are undefined.
fn fuzzy_fold<'a>(
    inputs: impl IntoIterator<Item = &'a ValueHolder>,
    dominant: Fuzzy,
    combine: fn(Fuzzy, Fuzzy) -> Fuzzy,
) -> ValueHolder {
    let mut acc: Option<Fuzzy> = None;
    let mut undefined = false;
    for input in inputs {
        match input.as_fuzzy() {
            Some(f) if f == dominant => return ValueHolder::fuzzy(dominant),
            Some(f) => acc = Some(acc.map_or(f, |a| combine(a, f))),
            None => undefined = true,
        }
    }
    match acc {
        Some(f) if !undefined => ValueHolder::fuzzy(f),
        _ => ValueHolder::undefined(ValueType::Fuzzy),
    }
}
