//! Typed node-execution errors.
//!
//! Every collaborator failure is caught at the executor boundary and wrapped
//! here with the node id and attempt count; nothing panics past the
//! scheduler.

use thiserror::Error;

use crate::condition::EvalError;
use crate::context::ContextMergeConflict;

/// Error returned by the action-invoker collaborator.
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// The underlying call (LLM, HTTP, script) failed.
    #[error("action failed: {0}")]
    Failed(String),

    /// The invoker observed the deadline and gave up.
    #[error("action deadline exceeded")]
    DeadlineExceeded,

    /// The invoker observed run cancellation.
    #[error("action cancelled")]
    Cancelled,
}

/// A node execution failed.
///
/// Recoverable per the node's retry policy; escalates to `RunError::Node`
/// only once the policy is exhausted or resolves to abort.
#[derive(Debug, Clone, Error)]
#[error("node {node_id} failed on attempt {attempt}: {kind}")]
pub struct NodeExecutionError {
    pub node_id: String,
    /// 0 for the first execution, incremented per retry.
    pub attempt: u32,
    pub kind: NodeErrorKind,
}

/// Underlying cause of a [`NodeExecutionError`].
#[derive(Debug, Clone, Error)]
pub enum NodeErrorKind {
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    /// The per-node timeout elapsed before the collaborator returned.
    #[error("node timed out")]
    Timeout,

    /// The run was cancelled while this node was in flight.
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Eval(#[from] EvalError),

    /// A loop iteration's context merge collided with a parent write.
    #[error(transparent)]
    Merge(#[from] ContextMergeConflict),

    /// A Loop node's body sub-run failed.
    #[error("loop body failed: {0}")]
    Subgraph(String),

    /// An Action node ran without an invoker configured on the engine.
    #[error("no action invoker configured")]
    NoInvoker,
}

impl NodeExecutionError {
    pub fn new(node_id: impl Into<String>, attempt: u32, kind: impl Into<NodeErrorKind>) -> Self {
        Self {
            node_id: node_id.into(),
            attempt,
            kind: kind.into(),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(
            self.kind,
            NodeErrorKind::Cancelled | NodeErrorKind::Invoke(InvokeError::Cancelled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Display carries node id, attempt, and the cause.
    #[test]
    fn display_carries_context() {
        let err = NodeExecutionError::new("n1", 2, InvokeError::Failed("boom".into()));
        let s = err.to_string();
        assert!(s.contains("n1") && s.contains("2") && s.contains("boom"), "{}", s);
    }
}
