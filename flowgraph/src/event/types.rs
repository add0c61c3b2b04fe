//! Lifecycle events emitted while a run executes.

use serde::Serialize;
use serde_json::Value;

/// One lifecycle event of a workflow run.
///
/// Published on the [`EventBus`](super::EventBus) and appended to the run's
/// trace ring. Listeners are observers only; nothing in the engine reads
/// these back.
#[derive(Debug, Clone, Serialize)]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        graph: String,
    },
    /// A scheduling wave began; `nodes` is the frontier in this generation.
    WaveStarted {
        run_id: String,
        index: u64,
        nodes: Vec<String>,
    },
    NodeStarted {
        node_id: String,
    },
    NodeCompleted {
        node_id: String,
        output: Value,
    },
    NodeFailed {
        node_id: String,
        error: String,
        attempt: u32,
    },
    /// A failed node is about to re-run under its retry policy.
    NodeRetrying {
        node_id: String,
        attempt: u32,
        delay_ms: u64,
    },
    NodeSkipped {
        node_id: String,
    },
    /// A failed node was replaced by its fallback node's execution.
    NodeFellBack {
        node_id: String,
        fallback: String,
    },
    RunCompleted {
        run_id: String,
        output: Value,
    },
    RunFailed {
        run_id: String,
        error: String,
    },
    RunSuspended {
        run_id: String,
        node_id: String,
    },
    RunCancelled {
        run_id: String,
    },
}

impl RunEvent {
    /// Node id the event concerns, when it is node-scoped.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            RunEvent::NodeStarted { node_id }
            | RunEvent::NodeCompleted { node_id, .. }
            | RunEvent::NodeFailed { node_id, .. }
            | RunEvent::NodeRetrying { node_id, .. }
            | RunEvent::NodeSkipped { node_id }
            | RunEvent::NodeFellBack { node_id, .. }
            | RunEvent::RunSuspended { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}
