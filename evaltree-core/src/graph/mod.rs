//! Expression Graph
//!
//! This module implements the shared expression DAG: node storage, the
//! merge (hash-consing) of inserted trees, reference-counted removal and
//! incremental recomputation.
//!
//! # Overview
//!
//! - Nodes live in an [`ExprArena`] and are addressed by [`NodeId`].
//! - Edges are stored on both ends: children on the parent and one parent
//!   entry per edge on the child.
//! - An [`ExprDag`] owns one arena, the reference-counted roots, the set of
//!   resident leaves and a pending queue.
//!
//! # Design Decisions
//!
//! 1. Handles instead of references. Parents and children refer to each
//!    other, which an arena of handles expresses without shared ownership.
//!
//! 2. One arena per DAG. Trees are built in the arena of the DAG they are
//!    meant for, so merging never moves nodes between arenas.
//!
//! 3. The pending queue is a type parameter. [`FifoQueue`] and
//!    [`DepthOrderedQueue`] give the two update orderings behind one DAG
//!    implementation.

mod arena;
mod content;
mod dag;
mod dot;
mod ids;
mod node;
mod scheduler;

pub(crate) use arena::Notifier;
pub use arena::ExprArena;
pub use content::ContentEqualSet;
pub use dag::{ExprDag, Removal, StrictExprDag, UpdateStats};
pub use ids::{DagId, GraphIdAllocator, InstanceId};
pub use node::{ContentKey, ExprNode, NodeId};
pub use scheduler::{DepthOrderedQueue, FifoQueue, PendingQueue, QueueEntry};
