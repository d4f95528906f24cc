//! Node Arena
//!
//! All nodes of one DAG, together with the unattached trees being prepared
//! for it, live in one [`ExprArena`]. Edges are stored as [`NodeId`] lists
//! on both ends: children on the parent, one parent entry per edge on the
//! child.
//!
//! # Tree lifecycle
//!
//! 1. Build a tree with the constructors (`int`, `int_link`, `binary`, ...).
//!    Children must be unattached; a tree may share its own subtrees, but
//!    a node used by two trees blocks inserting or discarding either one
//!    until the other is gone.
//! 2. [`ExprArena::instantiate`] binds the links to world data and computes
//!    every value bottom-up.
//! 3. Hand the root to `ExprDag::insert_expression`. Nodes that were not
//!    inserted can be released with [`ExprArena::discard_tree`].
//!
//! # Signals
//!
//! Bound links do not touch the arena from their world callbacks. They post
//! their handle into a shared inbox that the owning DAG drains at the start
//! of `update()` and `insert_expression()`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use super::ids::GraphIdAllocator;
use super::node::{ExprNode, NodeId};
use crate::error::{EvalError, Result};
use crate::ops::link::{LinkKind, LinkNode, SourceLink};
use crate::ops::{BinaryOp, MultiOp, Op, UnaryOp};
use crate::value::{Fuzzy, ValueHolder, ValueType};
use crate::world::{Sensor, Substitution};

/// Handles of leaves whose world data changed since the last drain.
#[derive(Debug, Clone, Default)]
pub(crate) struct SignalInbox {
    pending: Arc<Mutex<Vec<NodeId>>>,
}

impl SignalInbox {
    fn post(&self, node: NodeId) {
        self.pending.lock().push(node);
    }

    fn drain(&self) -> Vec<NodeId> {
        std::mem::take(&mut *self.pending.lock())
    }

    fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

/// Posts one node into its arena's inbox. Captured by world subscriptions.
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    inbox: SignalInbox,
    node: NodeId,
}

impl Notifier {
    pub(crate) fn notify(&self) {
        self.inbox.post(self.node);
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<ExprNode>,
}

/// Storage for expression nodes addressed by generational handles.
#[derive(Debug)]
pub struct ExprArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    ids: GraphIdAllocator,
    inbox: SignalInbox,
}

impl ExprArena {
    pub fn new(ids: GraphIdAllocator) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            ids,
            inbox: SignalInbox::default(),
        }
    }

    pub fn ids(&self) -> &GraphIdAllocator {
        &self.ids
    }

    pub fn get(&self, id: NodeId) -> Option<&ExprNode> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut ExprNode> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
    }

    /// Like [`get`](Self::get), failing with [`EvalError::StaleNode`].
    pub fn node(&self, id: NodeId) -> Result<&ExprNode> {
        self.get(id).ok_or(EvalError::StaleNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut ExprNode> {
        self.get_mut(id).ok_or(EvalError::StaleNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn value(&self, id: NodeId) -> Option<&ValueHolder> {
        self.get(id).map(ExprNode::value)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Label of a node for dumps and logs.
    pub fn info(&self, id: NodeId, debug: bool) -> String {
        self.get(id)
            .map(|node| node.info(debug))
            .unwrap_or_else(|| format!("<stale {}>", id))
    }

    fn alloc(&mut self, node: ExprNode) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId::new(index, 0)
    }

    /// Drop a node's storage. The caller has already detached its edges.
    pub(crate) fn release(&mut self, id: NodeId) {
        let Some(slot) = self.slots.get_mut(id.index() as usize) else {
            return;
        };
        if slot.generation != id.generation() || slot.node.is_none() {
            return;
        }
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.live -= 1;
    }

    // === Construction ===

    /// Add a node over `children`, checking arity and child types. Children
    /// must be unattached. The node's value is computed immediately.
    pub fn add(&mut self, op: Op, children: &[NodeId]) -> Result<NodeId> {
        let mut types: SmallVec<[ValueType; 2]> = SmallVec::new();
        let mut depth = 0;
        for &child in children {
            let node = self.node(child)?;
            if let Some(dag) = node.dag {
                return Err(EvalError::AlreadyResident { node: child, dag });
            }
            types.push(node.op.result_type());
            depth = depth.max(node.depth + 1);
        }
        op.check_children(&types)?;

        let value = {
            let values: SmallVec<[&ValueHolder; 4]> = children
                .iter()
                .filter_map(|&c| self.value(c))
                .collect();
            op.evaluate(&values)
        };
        let instance = self.ids.next_instance_id();
        let node = ExprNode::new(instance, op, children.iter().copied().collect(), depth, value);
        let id = self.alloc(node);
        for &child in children {
            if let Some(node) = self.get_mut(child) {
                node.parents.push(id);
            }
        }
        Ok(id)
    }

    fn add_leaf(&mut self, op: Op) -> NodeId {
        let value = op.leaf_value();
        let instance = self.ids.next_instance_id();
        self.alloc(ExprNode::new(instance, op, SmallVec::new(), 0, value))
    }

    pub fn int(&mut self, value: i64) -> NodeId {
        self.add_leaf(Op::IntConst(value))
    }

    pub fn fuzzy(&mut self, value: Fuzzy) -> NodeId {
        self.add_leaf(Op::FuzzyConst(value))
    }

    pub fn link(&mut self, kind: LinkKind, role: &str, attribute: &str) -> NodeId {
        self.add_leaf(Op::Link(LinkNode::new(kind, role, attribute)))
    }

    pub fn int_link(&mut self, role: &str, attribute: &str) -> NodeId {
        self.link(LinkKind::Int, role, attribute)
    }

    pub fn fuzzy_link(&mut self, role: &str, attribute: &str) -> NodeId {
        self.link(LinkKind::Fuzzy, role, attribute)
    }

    pub fn object_link(&mut self, role: &str, attribute: &str) -> NodeId {
        self.link(LinkKind::Object, role, attribute)
    }

    pub fn bool_object_link(&mut self, role: &str, attribute: &str) -> NodeId {
        self.link(LinkKind::BoolObject, role, attribute)
    }

    pub fn set_link(&mut self, role: &str, attribute: &str) -> NodeId {
        self.link(LinkKind::Set, role, attribute)
    }

    pub fn empty_source(&mut self, role: &str) -> NodeId {
        self.add_leaf(Op::EmptySource(SourceLink::new(role)))
    }

    pub fn unary(&mut self, op: UnaryOp, child: NodeId) -> Result<NodeId> {
        self.add(Op::Unary(op), &[child])
    }

    pub fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> Result<NodeId> {
        self.add(Op::Binary(op), &[left, right])
    }

    pub fn multi(&mut self, op: MultiOp, children: &[NodeId]) -> Result<NodeId> {
        self.add(Op::Multi(op), children)
    }

    // === Traversal helpers ===

    /// Unattached nodes of the tree under `root` in post-order, each once.
    /// Fails if any of them is resident.
    fn unattached_post_order(&self, root: NodeId) -> Result<Vec<NodeId>> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
        seen.insert(root);
        while let Some(&mut (id, ref mut next)) = stack.last_mut() {
            let node = self.node(id)?;
            if let Some(dag) = node.dag {
                return Err(EvalError::AlreadyResident { node: id, dag });
            }
            if let Some(&child) = node.children.get(*next) {
                *next += 1;
                if seen.insert(child) {
                    stack.push((child, 0));
                }
                continue;
            }
            stack.pop();
            order.push(id);
        }
        Ok(order)
    }

    /// Like `unattached_post_order`, but also fails when a node of the tree
    /// has a parent outside it. The root must have no parent at all.
    pub(crate) fn closed_post_order(&self, root: NodeId) -> Result<Vec<NodeId>> {
        let order = self.unattached_post_order(root)?;
        let members: HashSet<NodeId> = order.iter().copied().collect();
        for &id in &order {
            let node = self.node(id)?;
            let outside = node
                .parents
                .iter()
                .find(|&&p| id == root || !members.contains(&p));
            if let Some(&parent) = outside {
                return Err(EvalError::SharedOutsideTree { node: id, parent });
            }
        }
        Ok(order)
    }

    fn bind_leaf(&mut self, id: NodeId, subst: &Substitution) {
        let notifier = Notifier {
            inbox: self.inbox.clone(),
            node: id,
        };
        if let Some(node) = self.get_mut(id) {
            match &mut node.op {
                Op::Link(link) => link.bind(subst, notifier),
                Op::EmptySource(leaf) => leaf.bind(subst, notifier),
                _ => {}
            }
        }
    }

    fn unbind_leaf(&mut self, id: NodeId) {
        if let Some(node) = self.get_mut(id) {
            match &mut node.op {
                Op::Link(link) => link.unbind(),
                Op::EmptySource(leaf) => leaf.unbind(),
                _ => {}
            }
        }
    }

    // === Instantiation ===

    /// Bind every link of the unattached tree under `root` to the sources
    /// named by `subst` and recompute all values bottom-up.
    pub fn instantiate(&mut self, root: NodeId, subst: &Substitution, sensors: &[Sensor]) -> Result<()> {
        let order = self.unattached_post_order(root)?;
        trace!(root = %root, nodes = order.len(), sensors = sensors.len(), "instantiate");
        for id in order {
            if self.node(id)?.is_leaf() {
                self.bind_leaf(id, subst);
                self.refresh_leaf(id);
            } else {
                self.recompute(id);
            }
        }
        Ok(())
    }

    /// Drop the world bindings of one node and detach it from its
    /// children. Not recursive: the children may be shared.
    pub(crate) fn uninstantiate(&mut self, id: NodeId) {
        self.unbind_leaf(id);
        let children = match self.get_mut(id) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        for child in children {
            if let Some(node) = self.get_mut(child) {
                if let Some(pos) = node.parents.iter().position(|&p| p == id) {
                    node.parents.remove(pos);
                }
            }
        }
    }

    /// Drop the world bindings of a whole unattached tree, keeping its
    /// structure. The tree can be instantiated again afterwards.
    pub fn uninstantiate_tree(&mut self, root: NodeId) -> Result<()> {
        for id in self.unattached_post_order(root)? {
            self.unbind_leaf(id);
        }
        Ok(())
    }

    /// Release the part of an unattached tree only reachable from `root`.
    /// Returns the number of nodes freed. `root` itself must not have a
    /// parent.
    pub fn discard_tree(&mut self, root: NodeId) -> Result<usize> {
        let node = self.node(root)?;
        if let Some(dag) = node.dag {
            return Err(EvalError::AlreadyResident { node: root, dag });
        }
        if let Some(&parent) = node.parents.first() {
            return Err(EvalError::SharedOutsideTree { node: root, parent });
        }
        let mut freed = 0;
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.get(id) else {
                continue;
            };
            if node.dag.is_some() || !node.parents.is_empty() {
                continue;
            }
            queue.extend(node.children.iter().copied());
            self.uninstantiate(id);
            self.release(id);
            freed += 1;
        }
        Ok(freed)
    }

    /// Re-resolve the bindings of every link under `root` and signal the
    /// ones whose value moved. No leaf reads sensors, so `sensors` is only
    /// recorded in the trace.
    pub fn change_sensors(&mut self, root: NodeId, sensors: &[Sensor]) -> Result<usize> {
        let mut signalled = 0;
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let node = self.node_mut(id)?;
            stack.extend(node.children.iter().copied());
            let Op::Link(link) = &mut node.op else {
                continue;
            };
            link.resolve();
            if node.op.leaf_value() != node.value {
                self.inbox.post(id);
                signalled += 1;
            }
        }
        trace!(root = %root, sensors = sensors.len(), signalled, "change_sensors");
        Ok(signalled)
    }

    // === Copy and detached evaluation ===

    /// Deep copy of an unattached tree. Links are copied unbound, values
    /// are copied as they are. Sharing inside the tree is preserved.
    pub fn create_copy(&mut self, root: NodeId) -> Result<NodeId> {
        let order = match self.unattached_post_order(root) {
            Err(EvalError::AlreadyResident { node, dag }) => {
                return Err(EvalError::CopyOfResident { node, dag })
            }
            other => other?,
        };
        let mut copies: HashMap<NodeId, NodeId> = HashMap::with_capacity(order.len());
        for id in order {
            let node = self.node(id)?;
            let op = node.op.template_copy();
            let value = node.value.clone();
            let depth = node.depth;
            let children: SmallVec<[NodeId; 2]> = node
                .children
                .iter()
                .map(|c| copies.get(c).copied().ok_or(EvalError::StaleNode(*c)))
                .collect::<Result<_>>()?;
            let instance = self.ids.next_instance_id();
            let copy = self.alloc(ExprNode::new(instance, op, children.clone(), depth, value));
            for child in children {
                if let Some(node) = self.get_mut(child) {
                    node.parents.push(copy);
                }
            }
            copies.insert(id, copy);
        }
        copies.get(&root).copied().ok_or(EvalError::StaleNode(root))
    }

    /// Evaluate an unattached tree once against `subst` without binding any
    /// link. Node values are overwritten; the root's value is returned.
    pub fn dfs_eval(&mut self, root: NodeId, subst: &Substitution, sensors: &[Sensor]) -> Result<ValueHolder> {
        let order = self.unattached_post_order(root)?;
        trace!(root = %root, nodes = order.len(), sensors = sensors.len(), "dfs_eval");
        for id in order {
            let node = self.node_mut(id)?;
            let fresh = match &node.op {
                Op::Link(link) => Some(link.read_once(subst)),
                Op::EmptySource(leaf) => Some(leaf.read_once(subst)),
                _ => None,
            };
            match fresh {
                Some(value) => {
                    node.value.assign(value);
                }
                None => {
                    self.recompute(id);
                }
            }
        }
        Ok(self.node(root)?.value.clone())
    }

    // === Merge support ===

    /// Rewire an unattached `parent` from `old` to `new`, recomputing its
    /// value and depth. Only the first edge to `old` is moved; call once
    /// per edge. Returns false if nothing was rewired.
    pub(crate) fn remap_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> bool {
        if !self.contains(new) {
            return false;
        }
        let Some(node) = self.get_mut(parent) else {
            return false;
        };
        if node.dag.is_some() {
            return false;
        }
        let Some(slot) = node.children.iter().position(|&c| c == old) else {
            return false;
        };
        node.children[slot] = new;
        if let Some(old_node) = self.get_mut(old) {
            if let Some(pos) = old_node.parents.iter().position(|&p| p == parent) {
                old_node.parents.remove(pos);
            }
        }
        if let Some(new_node) = self.get_mut(new) {
            new_node.parents.push(parent);
        }
        let depth = self.get(parent).map_or(0, |node| {
            node.children
                .iter()
                .filter_map(|&c| self.get(c).map(|n| n.depth + 1))
                .max()
                .unwrap_or(0)
        });
        if let Some(node) = self.get_mut(parent) {
            node.depth = depth;
        }
        self.recompute(parent);
        true
    }

    // === Value maintenance ===

    /// Recompute an operator node from its children. Returns whether its
    /// value changed.
    pub(crate) fn recompute(&mut self, id: NodeId) -> bool {
        let next = {
            let Some(node) = self.get(id) else {
                return false;
            };
            if node.is_leaf() {
                node.op.leaf_value()
            } else {
                let values: SmallVec<[&ValueHolder; 4]> = node
                    .children
                    .iter()
                    .filter_map(|&c| self.value(c))
                    .collect();
                node.op.evaluate(&values)
            }
        };
        self.get_mut(id).map_or(false, |node| node.value.assign(next))
    }

    /// Re-resolve a leaf's binding and re-read its value. Returns whether
    /// the value changed.
    pub(crate) fn refresh_leaf(&mut self, id: NodeId) -> bool {
        let Some(node) = self.get_mut(id) else {
            return false;
        };
        if let Op::Link(link) = &mut node.op {
            link.resolve();
        }
        let next = node.op.leaf_value();
        node.value.assign(next)
    }

    /// Eagerly propagate a change of the unattached leaf `id` through its
    /// unattached ancestors.
    pub(crate) fn refresh_detached(&mut self, id: NodeId) {
        if !self.refresh_leaf(id) {
            return;
        }
        let mut queue: VecDeque<NodeId> = self
            .get(id)
            .map(|node| node.parents.iter().copied().collect())
            .unwrap_or_default();
        while let Some(parent) = queue.pop_front() {
            let unattached = self.get(parent).map_or(false, |node| node.dag.is_none());
            if unattached && self.recompute(parent) {
                if let Some(node) = self.get(parent) {
                    queue.extend(node.parents.iter().copied());
                }
            }
        }
    }

    pub(crate) fn take_signals(&self) -> Vec<NodeId> {
        self.inbox.drain()
    }

    pub(crate) fn has_signals(&self) -> bool {
        !self.inbox.is_empty()
    }
}
