//! Error types for the evaluation engine.

use thiserror::Error;

use crate::graph::{DagId, NodeId};
use crate::value::ValueType;

/// Result alias used throughout the crate.
pub type Result<T, E = EvalError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("node {0:?} does not exist (discarded or never allocated)")]
    StaleNode(NodeId),
    #[error("node {node:?} was never returned by insert_expression on DAG {dag}")]
    UnknownRoot { node: NodeId, dag: DagId },
    #[error("node {node:?} is already resident in DAG {dag}")]
    AlreadyResident { node: NodeId, dag: DagId },
    #[error("node {node:?} is still used by {parent:?}, which is outside the tree")]
    SharedOutsideTree { node: NodeId, parent: NodeId },
    #[error("node {node:?} is shared by DAG {dag} and cannot be copied")]
    CopyOfResident { node: NodeId, dag: DagId },
    #[error("operator {op} expects {expected} children, got {actual}")]
    ArityMismatch {
        op: &'static str,
        expected: String,
        actual: usize,
    },
    #[error("operator {op} argument {index}: expected {expected}, got {actual}")]
    TypeMismatch {
        op: &'static str,
        index: usize,
        expected: ValueType,
        actual: ValueType,
    },
    #[error("no operator registered for signature {0}")]
    UnknownOperator(String),
    #[error("operator {op} requires argument `{argument}`")]
    MissingArgument { op: String, argument: &'static str },
    #[error("invalid literal for operator {op}: {reason}")]
    InvalidLiteral { op: String, reason: String },
    #[error("invalid expression template: {0}")]
    InvalidTemplate(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
