//! Condition expressions: a small serde-friendly comparison tree.
//!
//! Used for edge conditions, node guards, Condition-node bodies, and loop
//! stop conditions. Native variants evaluate as a pure function over a
//! variable snapshot; `External` delegates to a pluggable backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A condition over the run's variable snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConditionExpr {
    /// variable `op` value.
    Compare {
        variable: String,
        op: CompareOp,
        value: Value,
    },
    /// True when every sub-condition holds (true for an empty list).
    All(Vec<ConditionExpr>),
    /// True when at least one sub-condition holds.
    Any(Vec<ConditionExpr>),
    Not(Box<ConditionExpr>),
    /// Opaque expression string evaluated by the configured
    /// `ConditionBackend` collaborator.
    External(String),
}

/// Comparison operators for [`ConditionExpr::Compare`].
///
/// Numeric operators coerce numeric strings; string operators use the
/// display form of scalars. Missing variables compare as null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
    StartsWith,
    EndsWith,
    IsEmpty,
    NotEmpty,
    IsTrue,
    Exists,
}

impl ConditionExpr {
    /// Condition that always holds.
    pub fn always() -> Self {
        ConditionExpr::All(Vec::new())
    }

    pub fn compare(variable: impl Into<String>, op: CompareOp, value: Value) -> Self {
        ConditionExpr::Compare {
            variable: variable.into(),
            op,
            value,
        }
    }

    pub fn eq(variable: impl Into<String>, value: Value) -> Self {
        Self::compare(variable, CompareOp::Eq, value)
    }

    pub fn gt(variable: impl Into<String>, value: Value) -> Self {
        Self::compare(variable, CompareOp::Gt, value)
    }

    pub fn le(variable: impl Into<String>, value: Value) -> Self {
        Self::compare(variable, CompareOp::Le, value)
    }

    /// True when the variable is boolean true (or the string "true").
    pub fn is_true(variable: impl Into<String>) -> Self {
        Self::compare(variable, CompareOp::IsTrue, Value::Null)
    }

    pub fn exists(variable: impl Into<String>) -> Self {
        Self::compare(variable, CompareOp::Exists, Value::Null)
    }

    pub fn not(expr: ConditionExpr) -> Self {
        ConditionExpr::Not(Box::new(expr))
    }

    pub fn external(expression: impl Into<String>) -> Self {
        ConditionExpr::External(expression.into())
    }
}
