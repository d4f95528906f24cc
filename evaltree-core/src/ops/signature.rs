//! Operator Signatures
//!
//! Expression templates name operators, not Rust types. The registry maps an
//! operator name plus the value types of its children to a constructor, so
//! `eq` over integers and `eq` over objects resolve to different operators.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::{smallvec, SmallVec};

use super::link::{LinkKind, LinkNode, SourceLink};
use super::{BinaryOp, MultiOp, Op, UnaryOp};
use crate::error::{EvalError, Result};
use crate::template::{ExprTemplate, Literal};
use crate::value::{Fuzzy, ValueType};

/// An operator name with the value types of its children.
///
/// A `multi` signature holds the single element type and matches any
/// non-empty child list of that type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeSignature {
    pub name: String,
    pub params: SmallVec<[ValueType; 2]>,
    pub multi: bool,
}

impl NodeSignature {
    pub fn new(name: impl Into<String>, params: &[ValueType]) -> Self {
        Self {
            name: name.into(),
            params: params.iter().copied().collect(),
            multi: false,
        }
    }

    pub fn multi(name: impl Into<String>, element: ValueType) -> Self {
        Self {
            name: name.into(),
            params: smallvec![element],
            multi: true,
        }
    }
}

impl fmt::Display for NodeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, ty) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", ty)?;
        }
        if self.multi {
            f.write_str("...")?;
        }
        f.write_str(")")
    }
}

/// Builds the operator for one template node.
pub type OpConstructor = Arc<dyn Fn(&ExprTemplate) -> Result<Op> + Send + Sync>;

/// Lookup table from signatures to operator constructors.
#[derive(Clone, Default)]
pub struct OperatorRegistry {
    constructors: IndexMap<NodeSignature, OpConstructor>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in operator and leaf.
    pub fn standard() -> Self {
        use ValueType::{Fuzzy as F, Integer as I, Object as O, Set as S};

        let mut registry = Self::new();

        registry.register(NodeSignature::new("fuzzy", &[]), fuzzy_constant);
        registry.register(NodeSignature::new("int", &[]), int_constant);
        registry.register(NodeSignature::new("intlink", &[]), |t| link(t, LinkKind::Int));
        registry.register(NodeSignature::new("fuzzylink", &[]), |t| link(t, LinkKind::Fuzzy));
        registry.register(NodeSignature::new("objectlink", &[]), |t| link(t, LinkKind::Object));
        registry.register(NodeSignature::new("boolobjectlink", &[]), |t| {
            link(t, LinkKind::BoolObject)
        });
        registry.register(NodeSignature::new("setlink", &[]), |t| link(t, LinkKind::Set));
        registry.register(NodeSignature::new("emptysource", &[]), |t| {
            Ok(Op::EmptySource(SourceLink::new(required(t, "role", &t.role)?)))
        });

        registry.register(NodeSignature::new("not", &[F]), |_| Ok(Op::Unary(UnaryOp::Not)));
        registry.register(NodeSignature::new("neg", &[I]), |_| Ok(Op::Unary(UnaryOp::Neg)));
        registry.register(NodeSignature::new("abs", &[I]), |_| Ok(Op::Unary(UnaryOp::Abs)));
        registry.register(NodeSignature::new("defined", &[F]), |_| {
            Ok(Op::Unary(UnaryOp::Defined(F)))
        });
        registry.register(NodeSignature::new("defined", &[I]), |_| {
            Ok(Op::Unary(UnaryOp::Defined(I)))
        });
        registry.register(NodeSignature::new("defined", &[O]), |_| {
            Ok(Op::Unary(UnaryOp::Defined(O)))
        });
        registry.register(NodeSignature::new("empty", &[S]), |_| {
            Ok(Op::Unary(UnaryOp::SetEmpty))
        });
        registry.register(NodeSignature::new("notempty", &[S]), |_| {
            Ok(Op::Unary(UnaryOp::SetNotEmpty))
        });

        let binaries = [
            BinaryOp::And,
            BinaryOp::Or,
            BinaryOp::FuzzyEq,
            BinaryOp::FuzzyNotEq,
            BinaryOp::FuzzyLt,
            BinaryOp::FuzzyGt,
            BinaryOp::Add,
            BinaryOp::Sub,
            BinaryOp::Mul,
            BinaryOp::Div,
            BinaryOp::Mod,
            BinaryOp::IntEq,
            BinaryOp::IntNotEq,
            BinaryOp::IntLt,
            BinaryOp::IntGt,
            BinaryOp::ObjectEq,
            BinaryOp::Union,
            BinaryOp::Intersection,
            BinaryOp::Difference,
        ];
        for op in binaries {
            let signature = NodeSignature::new(op.name(), &[op.param(), op.param()]);
            registry.register(signature, move |_| Ok(Op::Binary(op)));
        }

        registry.register(NodeSignature::multi("multiand", F), |_| Ok(Op::Multi(MultiOp::And)));
        registry.register(NodeSignature::multi("multior", F), |_| Ok(Op::Multi(MultiOp::Or)));

        registry
    }

    /// Add or replace a constructor.
    pub fn register<F>(&mut self, signature: NodeSignature, constructor: F)
    where
        F: Fn(&ExprTemplate) -> Result<Op> + Send + Sync + 'static,
    {
        self.constructors.insert(signature, Arc::new(constructor));
    }

    /// Find the constructor for `name` applied to children of `types`.
    /// An exact signature wins over a multi signature on the first type.
    pub fn lookup(&self, name: &str, types: &[ValueType]) -> Result<&OpConstructor> {
        let exact = NodeSignature::new(name, types);
        if let Some(constructor) = self.constructors.get(&exact) {
            return Ok(constructor);
        }
        if let Some(&first) = types.first() {
            let multi = NodeSignature::multi(name, first);
            if let Some(constructor) = self.constructors.get(&multi) {
                return Ok(constructor);
            }
        }
        Err(EvalError::UnknownOperator(exact.to_string()))
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    pub fn signatures(&self) -> impl Iterator<Item = &NodeSignature> {
        self.constructors.keys()
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.constructors.keys()).finish()
    }
}

fn required<'a>(template: &ExprTemplate, argument: &'static str, field: &'a Option<String>) -> Result<&'a str> {
    field
        .as_deref()
        .ok_or_else(|| EvalError::MissingArgument {
            op: template.op.clone(),
            argument,
        })
}

fn link(template: &ExprTemplate, kind: LinkKind) -> Result<Op> {
    let role = required(template, "role", &template.role)?;
    let attribute = required(template, "attribute", &template.attribute)?;
    Ok(Op::Link(LinkNode::new(kind, role, attribute)))
}

fn fuzzy_constant(template: &ExprTemplate) -> Result<Op> {
    match &template.value {
        Some(Literal::Bool(b)) => Ok(Op::FuzzyConst(Fuzzy::from_bool(*b))),
        Some(Literal::Int(degree)) => i16::try_from(*degree)
            .map(|d| Op::FuzzyConst(Fuzzy::new(d)))
            .map_err(|_| EvalError::InvalidLiteral {
                op: template.op.clone(),
                reason: format!("fuzzy degree {} out of range", degree),
            }),
        None => Err(EvalError::MissingArgument {
            op: template.op.clone(),
            argument: "value",
        }),
    }
}

fn int_constant(template: &ExprTemplate) -> Result<Op> {
    match &template.value {
        Some(Literal::Int(i)) => Ok(Op::IntConst(*i)),
        Some(Literal::Bool(_)) => Err(EvalError::InvalidLiteral {
            op: template.op.clone(),
            reason: "expected an integer".into(),
        }),
        None => Err(EvalError::MissingArgument {
            op: template.op.clone(),
            argument: "value",
        }),
    }
}
