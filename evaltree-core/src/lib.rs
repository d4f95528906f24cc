//! Evaltree Core
//!
//! This crate provides an incremental evaluation engine for large sets of
//! typed expressions, such as the conditions of behavior rules in a
//! simulated world. It implements:
//!
//! - Hash-consing of structurally equal subexpressions into a shared DAG
//! - Reference-counted removal of inserted expressions
//! - Lazy change propagation from world data to expression roots, in
//!   insertion order or in depth order
//! - A closed set of fuzzy, integer, object and set operators
//! - JSON expression templates resolved through an operator registry
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: fuzzy degrees and the typed value cells owned by nodes
//! - `world`: attributes, objects and sources that link leaves read
//! - `ops`: operator kinds, link leaves and the signature registry
//! - `graph`: the node arena, the DAG and its pending queues
//! - `template`: serde expression templates
//!
//! # Example
//!
//! ```rust
//! use evaltree_core::graph::{ExprDag, GraphIdAllocator};
//! use evaltree_core::ops::BinaryOp;
//! use evaltree_core::value::{Fuzzy, Value};
//! use evaltree_core::world::{Source, Substitution, WorldObject};
//!
//! let actor = WorldObject::new("actor");
//! actor.set_attribute("x", Value::Int(7));
//! let subst = Substitution::new().with("A", Source::of(&actor));
//!
//! let ids = GraphIdAllocator::new();
//! let mut dag: ExprDag = ExprDag::new(&ids);
//!
//! // gt(intlink(A.x), int(5))
//! let arena = dag.arena_mut();
//! let x = arena.int_link("A", "x");
//! let five = arena.int(5);
//! let gt = arena.binary(BinaryOp::IntGt, x, five)?;
//! arena.instantiate(gt, &subst, &[])?;
//! let gt = dag.insert_expression(gt)?;
//!
//! actor.set_attribute("x", Value::Int(3));
//! dag.update();
//! assert_eq!(dag.value(gt).and_then(|v| v.as_fuzzy()), Some(Fuzzy::FALSE));
//! # Ok::<(), evaltree_core::EvalError>(())
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod ops;
pub mod template;
pub mod value;
pub mod world;

pub use config::DagConfig;
pub use error::{EvalError, Result};
pub use graph::{ExprArena, ExprDag, GraphIdAllocator, NodeId, StrictExprDag};
pub use template::ExprTemplate;
