//! Graph validation error.
//!
//! Returned by `GraphBuilder::build` when the node/edge set does not form a
//! valid workflow graph. Raised at build time only; the scheduler never
//! re-checks structure at runtime.

use thiserror::Error;

/// Error when building a workflow graph.
///
/// Validation ensures node ids are unique, every edge endpoint exists, the
/// graph is acyclic, every node is reachable from a start node, loops carry
/// an explicit bound, and fallback targets exist.
#[derive(Debug, Error)]
pub enum GraphValidationError {
    /// Two nodes were registered with the same id.
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),

    /// An edge references a node id that was never registered. The field
    /// is `from`, not `source`, so thiserror does not infer an error source.
    #[error("edge {from} -> {to} references unknown node: {missing}")]
    DanglingEdge {
        from: String,
        to: String,
        missing: String,
    },

    /// The directed graph contains a cycle through the given node.
    #[error("cycle detected through node: {0}")]
    CycleDetected(String),

    /// A node cannot be reached from any start node.
    #[error("unreachable node: {0}")]
    UnreachableNode(String),

    /// No node qualifies as a start node (explicit Start kind or zero
    /// incoming edges).
    #[error("graph has no start node")]
    NoStartNode,

    /// A Loop node has neither an iteration cap nor a stop condition.
    #[error("loop node {0} has no iteration bound")]
    LoopWithoutBound(String),

    /// A Fallback retry policy names a node id that does not exist.
    #[error("node {node} falls back to unknown node: {fallback}")]
    UnknownFallbackNode { node: String, fallback: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Display formats carry the offending node ids.
    #[test]
    fn display_carries_node_ids() {
        let err = GraphValidationError::CycleDetected("b".into());
        assert!(err.to_string().contains("b"), "{}", err);

        let err = GraphValidationError::DanglingEdge {
            from: "a".into(),
            to: "ghost".into(),
            missing: "ghost".into(),
        };
        let s = err.to_string();
        assert!(s.contains("a") && s.contains("ghost"), "{}", s);
        // A String field must never be picked up as an error source.
        assert!(std::error::Error::source(&err).is_none());
    }
}
