//! Run aggregate: node/run status enums and the final result.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RunError;
use crate::event::RunEvent;
use crate::persist::RunSnapshot;

/// Lifecycle of one node within a run.
///
/// `Ready → Running → {Success, Failed, Skipped}`; `Failed → Running` only
/// through an explicit retry transition bounded by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Ready,
    Running,
    Success,
    Failed,
    Skipped,
}

impl NodeState {
    /// Terminal states never transition again within a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Success | NodeState::Failed | NodeState::Skipped)
    }
}

/// Lifecycle of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Ready,
    Running,
    Suspended,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// Outcome of `Engine::run` / `Engine::resume`.
///
/// Always carries the terminal status and the per-node state map; on failure
/// the first fatal error plus the trace history.
#[derive(Debug)]
pub struct RunResult {
    pub run_id: String,
    pub status: RunStatus,
    /// Last-writer-wins over the End-node outputs (`Value::Null` when the
    /// run produced none).
    pub output: Value,
    /// All End-node outputs, keyed by End-node id.
    pub outputs: BTreeMap<String, Value>,
    pub node_states: HashMap<String, NodeState>,
    pub retry_counts: HashMap<String, u32>,
    /// First fatal error, when `status` is `Failed` or `Cancelled`.
    pub error: Option<RunError>,
    /// Execution trace, oldest first (bounded by `RunOptions::trace_cap`).
    pub traces: Vec<RunEvent>,
    /// Resume handle, present when `status` is `Suspended`. Also saved
    /// through the `RunStore` when one is configured.
    pub snapshot: Option<RunSnapshot>,
}

impl RunResult {
    pub fn node_state(&self, node_id: &str) -> Option<NodeState> {
        self.node_states.get(node_id).copied()
    }

    pub fn retry_count(&self, node_id: &str) -> u32 {
        self.retry_counts.get(node_id).copied().unwrap_or(0)
    }
}
