//! DAG configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for an `ExprDag`. Every field has a default, so a partial JSON
/// object (or `{}`) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DagConfig {
    /// Initial capacity of the pending queue.
    pub queue_capacity: usize,
    /// Include instance ids and depths in node labels.
    pub debug_labels: bool,
}

impl Default for DagConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            debug_labels: false,
        }
    }
}

impl DagConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
