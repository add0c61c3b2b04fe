//! Edge: directed `(source, target)` link with an optional condition.

use crate::condition::ConditionExpr;

/// One directed edge of a workflow graph.
///
/// An edge with no condition is unconditional. Several unconditional edges
/// out of one node are a parallel fan-out, not a routing error; several
/// edges into one node make that node a join (admitted once every declared
/// predecessor is terminal).
#[derive(Debug, Clone)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub condition: Option<ConditionExpr>,
}

impl Edge {
    /// Unconditional edge from `source` to `target`.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: None,
        }
    }

    /// Edge taken only when `condition` evaluates true.
    pub fn when(
        source: impl Into<String>,
        target: impl Into<String>,
        condition: ConditionExpr,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: Some(condition),
        }
    }
}
