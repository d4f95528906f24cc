//! Expression Nodes
//!
//! This module defines the node type stored in an [`ExprArena`] and the
//! handle used to address it.
//!
//! [`ExprArena`]: super::ExprArena

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use smallvec::SmallVec;

use super::ids::{DagId, InstanceId};
use crate::ops::link::{Binding, LinkKind};
use crate::ops::{BinaryOp, MultiOp, Op, UnaryOp};
use crate::value::{Fuzzy, ValueHolder};

/// Handle to a node in an arena.
///
/// Handles are generational: once the node behind a handle has been
/// discarded, the handle no longer resolves, even if the slot was reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// The structural identity of a node: its kind plus the identity of its
/// children. Children are compared by handle, never by structure, because
/// they are already canonical when the key is taken.
///
/// Content equality and content hashing both come from this one value, so
/// they cannot disagree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentKey {
    Fuzzy(Fuzzy),
    Int(i64),
    Link {
        kind: LinkKind,
        binding: Binding,
        attribute: Arc<str>,
    },
    EmptySource(Binding),
    Unary(UnaryOp, SmallVec<[NodeId; 2]>),
    Binary(BinaryOp, SmallVec<[NodeId; 2]>),
    Multi(MultiOp, SmallVec<[NodeId; 2]>),
}

/// One node of an expression tree or DAG.
#[derive(Debug)]
pub struct ExprNode {
    pub(crate) instance: InstanceId,
    pub(crate) dag: Option<DagId>,
    pub(crate) op: Op,
    pub(crate) children: SmallVec<[NodeId; 2]>,
    pub(crate) parents: SmallVec<[NodeId; 2]>,
    pub(crate) depth: u32,
    pub(crate) value: ValueHolder,
    /// Set while the node sits in its DAG's pending queue.
    pub(crate) queued: bool,
}

impl ExprNode {
    pub(crate) fn new(
        instance: InstanceId,
        op: Op,
        children: SmallVec<[NodeId; 2]>,
        depth: u32,
        value: ValueHolder,
    ) -> Self {
        Self {
            instance,
            dag: None,
            op,
            children,
            parents: SmallVec::new(),
            depth,
            value,
            queued: false,
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    /// The DAG this node is resident in, `None` while unattached.
    pub fn dag_id(&self) -> Option<DagId> {
        self.dag
    }

    pub fn is_resident(&self) -> bool {
        self.dag.is_some()
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Option<NodeId> {
        self.children.get(index).copied()
    }

    /// Nodes reading this node's value. A parent appears once per edge.
    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    /// Longest path to a leaf; 0 for leaves.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn value(&self) -> &ValueHolder {
        &self.value
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn content_key(&self) -> ContentKey {
        match &self.op {
            Op::FuzzyConst(f) => ContentKey::Fuzzy(*f),
            Op::IntConst(i) => ContentKey::Int(*i),
            Op::Link(link) => ContentKey::Link {
                kind: link.kind(),
                binding: link.binding(),
                attribute: Arc::from(link.attribute()),
            },
            Op::EmptySource(leaf) => ContentKey::EmptySource(leaf.binding()),
            Op::Unary(op) => ContentKey::Unary(*op, self.children.clone()),
            Op::Binary(op) => ContentKey::Binary(*op, self.children.clone()),
            Op::Multi(op) => ContentKey::Multi(*op, self.children.clone()),
        }
    }

    pub fn content_equals(&self, other: &ExprNode) -> bool {
        self.content_key() == other.content_key()
    }

    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.content_key().hash(&mut hasher);
        hasher.finish()
    }

    /// Human readable label: operator, its arguments, and with `debug` the
    /// instance id and depth.
    pub fn info(&self, debug: bool) -> String {
        let args = self.op.info_arguments();
        let mut label = self.op.name().to_string();
        if !args.is_empty() {
            label.push('(');
            label.push_str(&args);
            label.push(')');
        }
        if debug {
            label.push_str(&format!(" : id={} level={}", self.instance, self.depth));
        }
        label
    }
}
