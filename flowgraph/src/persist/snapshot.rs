//! Serializable run state for suspend/resume.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::run::NodeState;

/// Everything needed to resume a suspended run: context state plus the
/// scheduler's position (visited set and pending frontier).
///
/// **Interaction**: produced by the engine when a run suspends; consumed by
/// `Engine::resume`. Stored through the `RunStore` collaborator; the core
/// never assumes a particular storage engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: String,
    /// Name of the graph this snapshot belongs to; resume rejects mismatches.
    pub graph: String,
    pub variables: HashMap<String, Value>,
    pub node_results: HashMap<String, Value>,
    pub node_states: HashMap<String, NodeState>,
    pub retry_counts: HashMap<String, u32>,
    /// Node ids already terminal when the run suspended.
    pub visited: Vec<String>,
    /// Frontier to re-enter on resume (includes the suspended nodes, reset
    /// to Ready).
    pub frontier: Vec<String>,
}
