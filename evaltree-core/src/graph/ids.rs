//! Identifier allocation for nodes and DAGs.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies the DAG a node is resident in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DagId(NonZeroU32);

impl DagId {
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for DagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Construction-order id of a node. Used as a stable tie-breaker and in
/// debug labels; never reused while the allocator is not reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct Counters {
    instances: AtomicU64,
    dags: AtomicU32,
}

/// Monotonic counters for node instance ids and DAG ids.
///
/// The allocator is owned by the world (or whatever loads expressions) and
/// handed to every DAG and arena it creates. Clones share the counters.
/// Instance ids start at 0 and DAG ids at 1.
#[derive(Debug, Clone)]
pub struct GraphIdAllocator {
    counters: Arc<Counters>,
}

impl GraphIdAllocator {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters {
                instances: AtomicU64::new(0),
                dags: AtomicU32::new(1),
            }),
        }
    }

    pub fn next_instance_id(&self) -> InstanceId {
        InstanceId(self.counters.instances.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_dag_id(&self) -> DagId {
        let raw = self.counters.dags.fetch_add(1, Ordering::Relaxed);
        // Wrapping past u32::MAX would need four billion DAGs.
        DagId(NonZeroU32::new(raw).unwrap_or(NonZeroU32::MIN))
    }

    /// Restart both sequences. Only call this at world (re)load, when no
    /// DAG built from this allocator survives.
    pub fn reset(&self) {
        self.counters.instances.store(0, Ordering::Relaxed);
        self.counters.dags.store(1, Ordering::Relaxed);
    }
}

impl Default for GraphIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_documented_values() {
        let ids = GraphIdAllocator::new();
        assert_eq!(ids.next_instance_id().raw(), 0);
        assert_eq!(ids.next_dag_id().get(), 1);
        assert_eq!(ids.next_dag_id().get(), 2);
    }

    #[test]
    fn clones_share_counters() {
        let ids = GraphIdAllocator::new();
        let other = ids.clone();
        let first = ids.next_instance_id();
        let second = other.next_instance_id();
        assert!(first < second);
    }

    #[test]
    fn reset_restarts_sequences() {
        let ids = GraphIdAllocator::new();
        ids.next_instance_id();
        ids.next_dag_id();
        ids.reset();
        assert_eq!(ids.next_instance_id().raw(), 0);
        assert_eq!(ids.next_dag_id().get(), 1);
    }
}
