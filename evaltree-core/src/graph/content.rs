//! Candidate set for merging.
//!
//! Maps content keys to the resident node carrying them. The set is scratch
//! state of a single insertion: seeded with the DAG's leaves, widened with
//! parents of matched nodes, cleared afterwards.

use indexmap::IndexMap;

use super::arena::ExprArena;
use super::node::{ContentKey, NodeId};

#[derive(Debug, Default)]
pub struct ContentEqualSet {
    members: IndexMap<ContentKey, NodeId>,
}

impl ContentEqualSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` under its content key. If a content-equal member is already
    /// present it is kept and returned instead.
    pub fn insert(&mut self, arena: &ExprArena, id: NodeId) -> Option<NodeId> {
        let key = arena.get(id)?.content_key();
        match self.members.get(&key) {
            Some(&existing) => Some(existing),
            None => {
                self.members.insert(key, id);
                None
            }
        }
    }

    /// The member content-equal to `id`, if any.
    pub fn find(&self, arena: &ExprArena, id: NodeId) -> Option<NodeId> {
        let key = arena.get(id)?.content_key();
        self.get(&key)
    }

    pub fn get(&self, key: &ContentKey) -> Option<NodeId> {
        self.members.get(key).copied()
    }

    pub fn remove(&mut self, arena: &ExprArena, id: NodeId) -> bool {
        let Some(node) = arena.get(id) else {
            return false;
        };
        let key = node.content_key();
        if self.members.get(&key) == Some(&id) {
            self.members.swap_remove(&key);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
