//! Pending Queues
//!
//! The pending queue decides the order in which a DAG re-derives nodes
//! during `update()`.
//!
//! # Orderings
//!
//! [`FifoQueue`] processes nodes in the order they were enqueued. A node
//! reachable through paths of different lengths may be recomputed more
//! than once per cycle, which is fine when recomputation is cheap.
//!
//! [`DepthOrderedQueue`] always pops the pending node with the smallest
//! `(depth, instance id)`. Children are strictly shallower than their
//! parents, so every pending child is processed before its parent and no
//! node is recomputed twice in one cycle. The instance id keeps distinct
//! nodes of equal depth from colliding in the ordered set.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use super::ids::InstanceId;
use super::node::NodeId;

/// A node waiting to be re-derived, with its ordering key.
///
/// Field order matters: the derived `Ord` compares depth first, then the
/// instance id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueueEntry {
    pub depth: u32,
    pub instance: InstanceId,
    pub node: NodeId,
}

/// Storage for the nodes a DAG still has to process.
///
/// Implementations do not deduplicate; the DAG tracks membership with a
/// per-node flag.
pub trait PendingQueue: Default + fmt::Debug {
    fn with_capacity(capacity: usize) -> Self;

    fn push(&mut self, entry: QueueEntry);

    fn pop(&mut self) -> Option<NodeId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);
}

/// Insertion-ordered queue.
#[derive(Debug, Default)]
pub struct FifoQueue {
    entries: VecDeque<NodeId>,
}

impl PendingQueue for FifoQueue {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry.node);
    }

    fn pop(&mut self) -> Option<NodeId> {
        self.entries.pop_front()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Queue ordered by `(depth, instance id)`, shallowest first.
#[derive(Debug, Default)]
pub struct DepthOrderedQueue {
    entries: BTreeSet<QueueEntry>,
}

impl PendingQueue for DepthOrderedQueue {
    fn with_capacity(_capacity: usize) -> Self {
        Self::default()
    }

    fn push(&mut self, entry: QueueEntry) {
        self.entries.insert(entry);
    }

    fn pop(&mut self) -> Option<NodeId> {
        self.entries.pop_first().map(|entry| entry.node)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphIdAllocator;

    fn entries(depths: &[u32]) -> Vec<QueueEntry> {
        let ids = GraphIdAllocator::new();
        depths
            .iter()
            .enumerate()
            .map(|(i, &depth)| QueueEntry {
                depth,
                instance: ids.next_instance_id(),
                node: NodeId::new(i as u32, 0),
            })
            .collect()
    }

    fn drain<Q: PendingQueue>(queue: &mut Q) -> Vec<u32> {
        std::iter::from_fn(|| queue.pop()).map(|id| id.index()).collect()
    }

    #[test]
    fn fifo_keeps_insertion_order() {
        let mut queue = FifoQueue::with_capacity(4);
        for entry in entries(&[3, 0, 2]) {
            queue.push(entry);
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(drain(&mut queue), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn depth_order_pops_shallowest_first() {
        let mut queue = DepthOrderedQueue::default();
        for entry in entries(&[3, 0, 2, 0]) {
            queue.push(entry);
        }
        // Equal depths fall back to the instance id.
        assert_eq!(drain(&mut queue), vec![1, 3, 2, 0]);
    }

    #[test]
    fn equal_depth_entries_do_not_collide() {
        let mut queue = DepthOrderedQueue::default();
        for entry in entries(&[1, 1, 1]) {
            queue.push(entry);
        }
        assert_eq!(queue.len(), 3);
        queue.clear();
        assert!(queue.is_empty());
    }
}
