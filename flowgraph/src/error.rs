//! Run-level error taxonomy.
//!
//! Node-local failures are resolved by the retry policy first; only
//! policy-exhausted or fatal errors surface here and end the run.

use thiserror::Error;

use crate::context::ContextMergeConflict;
use crate::executor::NodeExecutionError;

/// Fatal error ending a run.
///
/// Carried in `RunResult::error` alongside the terminal status; the per-node
/// failure history stays in the traces.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    /// A node failed and its policy resolved to abort (or retries ran out).
    #[error(transparent)]
    Node(#[from] NodeExecutionError),

    /// A loop-branch merge collided with a parent write.
    #[error(transparent)]
    MergeConflict(#[from] ContextMergeConflict),

    /// The frontier drained without reaching any End node.
    #[error("no terminal node reached")]
    NoTerminalReached,

    /// The run was cancelled through its cancel token.
    #[error("run cancelled")]
    Cancelled,

    /// The run-level timeout elapsed.
    #[error("run deadline exceeded")]
    DeadlineExceeded,

    /// The run-state store failed at a suspend/resume boundary.
    #[error("run-state persistence failed: {0}")]
    Persist(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Transparent variants surface the inner message.
    #[test]
    fn transparent_display() {
        let err = RunError::from(ContextMergeConflict { key: "k".into() });
        assert!(err.to_string().contains("k"), "{}", err);
        assert!(RunError::NoTerminalReached
            .to_string()
            .contains("no terminal"));
    }
}
