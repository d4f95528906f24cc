//! Expression Templates
//!
//! A serde description of an expression tree, typically loaded from JSON:
//!
//! ```json
//! {"op": "gt", "children": [
//!     {"op": "intlink", "role": "A", "attribute": "x"},
//!     {"op": "int", "value": 5}
//! ]}
//! ```
//!
//! Building a template resolves every node through an
//! [`OperatorRegistry`] using the operator name and the result types of the
//! already built children.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::{ExprArena, NodeId};
use crate::ops::signature::OperatorRegistry;

/// A constant in a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(i64),
}

/// One node of an expression template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExprTemplate {
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Literal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ExprTemplate>,
}

impl ExprTemplate {
    pub fn op(name: impl Into<String>) -> Self {
        Self {
            op: name.into(),
            value: None,
            role: None,
            attribute: None,
            children: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: Literal) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn with_child(mut self, child: ExprTemplate) -> Self {
        self.children.push(child);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Build the template as a fresh, unattached tree in `arena`.
    ///
    /// On failure every node built so far is released again.
    pub fn build(&self, registry: &OperatorRegistry, arena: &mut ExprArena) -> Result<NodeId> {
        let mut children = Vec::with_capacity(self.children.len());
        for child in &self.children {
            match child.build(registry, arena) {
                Ok(id) => children.push(id),
                Err(err) => {
                    discard_all(arena, &children);
                    return Err(err);
                }
            }
        }

        let built = children
            .iter()
            .map(|&c| arena.node(c).map(|node| node.op().result_type()))
            .collect::<Result<Vec<_>>>()
            .and_then(|types| {
                let constructor = registry.lookup(&self.op, &types)?;
                let op = constructor(self)?;
                arena.add(op, &children)
            });
        if built.is_err() {
            discard_all(arena, &children);
        }
        built
    }
}

fn discard_all(arena: &mut ExprArena, roots: &[NodeId]) {
    for &root in roots {
        if let Err(err) = arena.discard_tree(root) {
            tracing::debug!(root = %root, error = %err, "could not discard partial tree");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use crate::graph::GraphIdAllocator;
    use crate::value::Fuzzy;

    const GT: &str = r#"{
        "op": "gt",
        "children": [
            {"op": "intlink", "role": "A", "attribute": "x"},
            {"op": "int", "value": 5}
        ]
    }"#;

    #[test]
    fn parse_template() {
        let template = ExprTemplate::from_json(GT).unwrap();
        assert_eq!(template.op, "gt");
        assert_eq!(template.children.len(), 2);
        assert_eq!(template.children[1].value, Some(Literal::Int(5)));
        assert_eq!(template.children[0].role.as_deref(), Some("A"));
    }

    #[test]
    fn build_resolves_operators_by_child_types() {
        let registry = OperatorRegistry::standard();
        let mut arena = ExprArena::new(GraphIdAllocator::new());
        let root = ExprTemplate::from_json(GT)
            .unwrap()
            .build(&registry, &mut arena)
            .unwrap();

        let node = arena.node(root).unwrap();
        assert_eq!(node.info(false), "gt");
        assert_eq!(node.children().len(), 2);
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn failed_build_releases_partial_tree() {
        let registry = OperatorRegistry::standard();
        let mut arena = ExprArena::new(GraphIdAllocator::new());
        let template = ExprTemplate::op("and")
            .with_child(ExprTemplate::op("fuzzy").with_value(Literal::Bool(true)))
            .with_child(ExprTemplate::op("int").with_value(Literal::Int(1)));

        let err = template.build(&registry, &mut arena).unwrap_err();
        assert!(matches!(err, EvalError::UnknownOperator(_)));
        assert!(arena.is_empty());
    }

    #[test]
    fn fuzzy_literals_accept_bool_and_degree() {
        let registry = OperatorRegistry::standard();
        let mut arena = ExprArena::new(GraphIdAllocator::new());
        let yes = ExprTemplate::op("fuzzy").with_value(Literal::Bool(true));
        let half = ExprTemplate::op("fuzzy").with_value(Literal::Int(0));

        let yes = yes.build(&registry, &mut arena).unwrap();
        let half = half.build(&registry, &mut arena).unwrap();
        assert_eq!(arena.value(yes).and_then(|v| v.as_fuzzy()), Some(Fuzzy::TRUE));
        assert_eq!(arena.value(half).and_then(|v| v.as_fuzzy()), Some(Fuzzy::new(0)));
    }

    #[test]
    fn round_trips_through_json() {
        let template = ExprTemplate::from_json(GT).unwrap();
        let json = template.to_json().unwrap();
        assert!(!json.contains("null"));
        assert_eq!(ExprTemplate::from_json(&json).unwrap(), template);
    }
}
