//! Condition expressions and evaluation.
//!
//! Edge conditions, node guards, and loop bounds all share `ConditionExpr`.
//! Native variants evaluate as a pure function over a variable snapshot;
//! `External` strings go through the `ConditionBackend` collaborator.

mod evaluator;
mod expr;

pub use evaluator::{evaluate, evaluate_native, is_truthy, ConditionBackend, EvalError};
pub use expr::{CompareOp, ConditionExpr};
