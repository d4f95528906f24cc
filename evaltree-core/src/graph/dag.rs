//! Expression DAG
//!
//! An [`ExprDag`] shares structurally equal subexpressions between all the
//! trees inserted into it and keeps their values current incrementally.
//!
//! # Insertion
//!
//! `insert_expression` walks the new tree in post-order. Each node, once its
//! children are canonical, is looked up in a candidate set seeded with the
//! DAG's leaves. On a match the new node is dropped and its unattached
//! parents are rewired to the match, whose resident parents then join the
//! candidates. Without a match the node becomes resident and itself joins
//! the candidates. The cost is bounded by the size of the new tree plus the
//! parents of matched nodes, not by the size of the DAG.
//!
//! # Removal
//!
//! Roots are reference counted. When a root's count drops to zero, a
//! breadth-first walk frees every node that has no parent left and is not
//! itself a root.
//!
//! # Updates
//!
//! World changes only enqueue leaves. `update()` drains the queue; a node
//! whose value changed enqueues its parents. The queue type decides the
//! order, see [`scheduler`](super::scheduler).

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, error, trace};

use super::arena::ExprArena;
use super::content::ContentEqualSet;
use super::dot::write_dot;
use super::ids::{DagId, GraphIdAllocator};
use super::node::NodeId;
use super::scheduler::{DepthOrderedQueue, FifoQueue, PendingQueue, QueueEntry};
use crate::config::DagConfig;
use crate::error::{EvalError, Result};
use crate::value::ValueHolder;
use crate::world::Sensor;

/// DAG whose pending queue is ordered by depth.
pub type StrictExprDag = ExprDag<DepthOrderedQueue>;

/// Outcome of [`ExprDag::remove_expression`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Other insertions still use the root.
    StillReferenced { remaining: usize },
    /// The root's last use is gone; `freed` nodes were released.
    Released { freed: usize },
}

/// Counters of one `update()` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStats {
    /// Nodes re-derived.
    pub recomputed: usize,
    /// Nodes whose value changed.
    pub changed: usize,
}

#[derive(Debug)]
pub struct ExprDag<Q: PendingQueue = FifoQueue> {
    id: DagId,
    arena: ExprArena,
    roots: IndexMap<NodeId, usize>,
    leaves: IndexSet<NodeId>,
    queue: Q,
    candidates: ContentEqualSet,
    config: DagConfig,
}

impl<Q: PendingQueue> ExprDag<Q> {
    pub fn new(ids: &GraphIdAllocator) -> Self {
        Self::with_config(ids, DagConfig::default())
    }

    pub fn with_config(ids: &GraphIdAllocator, config: DagConfig) -> Self {
        Self {
            id: ids.next_dag_id(),
            arena: ExprArena::new(ids.clone()),
            roots: IndexMap::new(),
            leaves: IndexSet::new(),
            queue: Q::with_capacity(config.queue_capacity),
            candidates: ContentEqualSet::new(),
            config,
        }
    }

    pub fn id(&self) -> DagId {
        self.id
    }

    pub fn config(&self) -> &DagConfig {
        &self.config
    }

    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }

    /// The arena new trees for this DAG are built in.
    pub fn arena_mut(&mut self) -> &mut ExprArena {
        &mut self.arena
    }

    /// Merge the instantiated, unattached tree under `root` into the DAG and
    /// return its canonical root.
    ///
    /// The tree must be closed: no node in it may be used by a parent
    /// outside the tree. The whole tree is checked before anything is
    /// merged, so a rejected tree leaves the DAG as it was.
    pub fn insert_expression(&mut self, root: NodeId) -> Result<NodeId> {
        self.absorb_signals();
        if let Some(dag) = self.arena.node(root)?.dag_id() {
            return Err(EvalError::AlreadyResident { node: root, dag });
        }
        let order = self.arena.closed_post_order(root)?;

        for &leaf in &self.leaves {
            self.candidates.insert(&self.arena, leaf);
        }

        let mut created = 0;
        let mut merged = 0;
        let mut canonical = root;
        for id in order {
            canonical = match self.candidates.find(&self.arena, id) {
                Some(existing) => {
                    self.absorb(id, existing);
                    merged += 1;
                    existing
                }
                None => {
                    self.admit(id);
                    created += 1;
                    id
                }
            };
        }

        *self.roots.entry(canonical).or_insert(0) += 1;
        self.candidates.clear();
        debug!(
            dag = %self.id,
            root = %canonical,
            created,
            merged,
            "inserted expression"
        );
        Ok(canonical)
    }

    /// Replace the unattached `node` by the resident, content-equal
    /// `existing`.
    fn absorb(&mut self, node: NodeId, existing: NodeId) {
        let widen: Vec<NodeId> = self
            .arena
            .get(existing)
            .map(|n| n.parents().to_vec())
            .unwrap_or_default();
        for parent in widen {
            if self.is_resident(parent) {
                self.candidates.insert(&self.arena, parent);
            }
        }

        let parents: Vec<NodeId> = self
            .arena
            .get(node)
            .map(|n| n.parents().to_vec())
            .unwrap_or_default();
        for parent in parents {
            self.arena.remap_child(parent, node, existing);
        }

        self.arena.uninstantiate(node);
        self.arena.release(node);
    }

    /// Make the unattached `node` resident.
    fn admit(&mut self, node: NodeId) {
        let dag = self.id;
        let Some(n) = self.arena.get_mut(node) else {
            return;
        };
        n.dag = Some(dag);
        if n.is_leaf() {
            self.leaves.insert(node);
        }
        self.candidates.insert(&self.arena, node);
    }

    /// Drop one use of `root`. Frees the part of the DAG only reachable
    /// from it once the last use is gone.
    ///
    /// Removing a root that is not currently inserted logs an error and
    /// leaves the DAG untouched.
    pub fn remove_expression(&mut self, root: NodeId) -> Result<Removal> {
        let Some(count) = self.roots.get_mut(&root) else {
            error!(dag = %self.id, root = %root, "removing an expression that was never inserted");
            return Err(EvalError::UnknownRoot {
                node: root,
                dag: self.id,
            });
        };
        *count -= 1;
        if *count > 0 {
            return Ok(Removal::StillReferenced { remaining: *count });
        }
        self.roots.shift_remove(&root);

        let mut freed = 0;
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.arena.get(id) else {
                continue;
            };
            if node.dag_id() != Some(self.id)
                || !node.parents().is_empty()
                || self.roots.contains_key(&id)
            {
                continue;
            }
            queue.extend(node.children().iter().copied());
            self.arena.uninstantiate(id);
            self.leaves.shift_remove(&id);
            self.arena.release(id);
            freed += 1;
        }

        debug!(dag = %self.id, root = %root, freed, "removed expression");
        Ok(Removal::Released { freed })
    }

    /// Whether `update()` has anything to do.
    pub fn need_update(&self) -> bool {
        !self.queue.is_empty() || self.arena.has_signals()
    }

    /// Re-derive every pending node until the queue is empty.
    pub fn update(&mut self) -> UpdateStats {
        self.absorb_signals();
        let mut stats = UpdateStats::default();
        while let Some(id) = self.queue.pop() {
            let leaf = match self.arena.get_mut(id) {
                Some(node) if node.dag == Some(self.id) => {
                    node.queued = false;
                    node.is_leaf()
                }
                _ => continue,
            };
            stats.recomputed += 1;
            let changed = if leaf {
                self.arena.refresh_leaf(id)
            } else {
                self.arena.recompute(id)
            };
            if changed {
                stats.changed += 1;
                self.enqueue_parents(id);
            }
        }
        trace!(
            dag = %self.id,
            recomputed = stats.recomputed,
            changed = stats.changed,
            "update"
        );
        stats
    }

    /// Pass `sensors` to every inserted expression. Links whose value moved
    /// are picked up by the next `update()`.
    pub fn change_sensors(&mut self, sensors: &[Sensor]) -> Result<usize> {
        let roots: Vec<NodeId> = self.roots.keys().copied().collect();
        let mut signalled = 0;
        for root in roots {
            signalled += self.arena.change_sensors(root, sensors)?;
        }
        Ok(signalled)
    }

    fn absorb_signals(&mut self) {
        for id in self.arena.take_signals() {
            match self.arena.get(id).map(|node| node.dag_id()) {
                Some(Some(dag)) if dag == self.id => self.enqueue(id),
                Some(None) => self.arena.refresh_detached(id),
                _ => {}
            }
        }
    }

    fn enqueue(&mut self, id: NodeId) {
        let Some(node) = self.arena.get_mut(id) else {
            return;
        };
        if node.queued {
            return;
        }
        node.queued = true;
        let entry = QueueEntry {
            depth: node.depth,
            instance: node.instance,
            node: id,
        };
        self.queue.push(entry);
    }

    fn enqueue_parents(&mut self, id: NodeId) {
        let parents: Vec<NodeId> = self
            .arena
            .get(id)
            .map(|node| node.parents().to_vec())
            .unwrap_or_default();
        for parent in parents {
            if self.is_resident(parent) {
                self.enqueue(parent);
            }
        }
    }

    // === Introspection ===

    pub fn value(&self, id: NodeId) -> Option<&ValueHolder> {
        self.arena.value(id)
    }

    /// Canonical roots with their usage counts, in insertion order.
    pub fn roots(&self) -> impl Iterator<Item = (NodeId, usize)> + '_ {
        self.roots.iter().map(|(&id, &count)| (id, count))
    }

    pub fn root_usage(&self, root: NodeId) -> usize {
        self.roots.get(&root).copied().unwrap_or(0)
    }

    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.leaves.iter().copied()
    }

    /// Whether `id` is resident in this DAG.
    pub fn is_resident(&self, id: NodeId) -> bool {
        self.arena
            .get(id)
            .map_or(false, |node| node.dag_id() == Some(self.id))
    }

    /// Number of nodes resident in this DAG.
    pub fn resident_count(&self) -> usize {
        let mut seen: IndexSet<NodeId> = self.roots.keys().copied().collect();
        let mut index = 0;
        while let Some(&id) = seen.get_index(index) {
            index += 1;
            if let Some(node) = self.arena.get(id) {
                seen.extend(node.children().iter().copied());
            }
        }
        seen.len()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    // === Export ===

    /// Graphviz description of the DAG.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = write_dot(&mut out, self.id, &self.arena, &self.roots, self.config.debug_labels);
        out
    }

    pub fn dump_to(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.dump())?;
        Ok(())
    }
}
