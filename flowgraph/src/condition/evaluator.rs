//! Condition evaluation: pure native evaluation plus the external backend
//! seam for string-expression engines.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::{CompareOp, ConditionExpr};

/// Error when evaluating a condition.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// An `External` expression was used but no backend is configured.
    #[error("no condition backend configured for expression: {0}")]
    NoBackend(String),

    /// The backend rejected or failed to evaluate the expression.
    #[error("condition backend failed for {expression}: {message}")]
    Backend { expression: String, message: String },
}

/// External collaborator evaluating opaque expression strings.
///
/// Covers scripting engines the core never embeds. Implementations must be
/// deterministic for the routing guarantees of conditional edges to hold.
#[async_trait]
pub trait ConditionBackend: Send + Sync {
    async fn evaluate(
        &self,
        expression: &str,
        variables: &HashMap<String, Value>,
    ) -> Result<Value, EvalError>;
}

/// Evaluates `expr` against a variable snapshot.
///
/// Native variants never fail; only `External` can return an error (missing
/// backend or backend failure). Non-boolean backend results are reduced by
/// [`is_truthy`].
pub async fn evaluate(
    expr: &ConditionExpr,
    variables: &HashMap<String, Value>,
    backend: Option<&dyn ConditionBackend>,
) -> Result<bool, EvalError> {
    match expr {
        ConditionExpr::External(expression) => {
            let backend = backend
                .ok_or_else(|| EvalError::NoBackend(expression.clone()))?;
            let value = backend.evaluate(expression, variables).await?;
            Ok(is_truthy(&value))
        }
        // Combinators recurse through this entry point so an External
        // anywhere in the tree still reaches the backend.
        ConditionExpr::All(exprs) => {
            for e in exprs {
                if !Box::pin(evaluate(e, variables, backend)).await? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ConditionExpr::Any(exprs) => {
            for e in exprs {
                if Box::pin(evaluate(e, variables, backend)).await? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        ConditionExpr::Not(inner) => Ok(!Box::pin(evaluate(inner, variables, backend)).await?),
        compare => Ok(evaluate_native(compare, variables)),
    }
}

/// Pure evaluation of the native condition variants.
///
/// `External` inside a native tree evaluates false here; the async
/// [`evaluate`] entry point is required for backend delegation.
pub fn evaluate_native(expr: &ConditionExpr, variables: &HashMap<String, Value>) -> bool {
    match expr {
        ConditionExpr::Compare { variable, op, value } => {
            let actual = variables.get(variable).unwrap_or(&Value::Null);
            compare(actual, *op, value)
        }
        ConditionExpr::All(exprs) => exprs.iter().all(|e| evaluate_native(e, variables)),
        ConditionExpr::Any(exprs) => exprs.iter().any(|e| evaluate_native(e, variables)),
        ConditionExpr::Not(inner) => !evaluate_native(inner, variables),
        ConditionExpr::External(_) => false,
    }
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    match op {
        CompareOp::Eq => match (as_f64(actual), as_f64(expected)) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => display_string(actual) == display_string(expected),
        },
        CompareOp::NotEq => !compare(actual, CompareOp::Eq, expected),
        CompareOp::Gt => numeric(actual, expected, |a, b| a > b),
        CompareOp::Lt => numeric(actual, expected, |a, b| a < b),
        CompareOp::Ge => numeric(actual, expected, |a, b| a >= b),
        CompareOp::Le => numeric(actual, expected, |a, b| a <= b),
        CompareOp::Contains => match actual {
            Value::String(s) => s.contains(&display_string(expected)),
            Value::Array(items) => items.iter().any(|i| compare(i, CompareOp::Eq, expected)),
            _ => false,
        },
        CompareOp::StartsWith => display_string(actual).starts_with(&display_string(expected)),
        CompareOp::EndsWith => display_string(actual).ends_with(&display_string(expected)),
        CompareOp::IsEmpty => is_empty(actual),
        CompareOp::NotEmpty => !is_empty(actual),
        CompareOp::IsTrue => is_truthy(actual),
        CompareOp::Exists => !actual.is_null(),
    }
}

fn numeric(actual: &Value, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (as_f64(actual), as_f64(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn display_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Truthiness for non-boolean condition results: null, false, zero, and
/// empty strings are false; everything else is true.
pub fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// **Scenario**: Numeric comparison coerces numeric strings; x > 5 holds
    /// for x = 10 and for x = "10".
    #[test]
    fn numeric_comparison_with_coercion() {
        let expr = ConditionExpr::gt("x", json!(5));
        assert!(evaluate_native(&expr, &vars(&[("x", json!(10))])));
        assert!(evaluate_native(&expr, &vars(&[("x", json!("10"))])));
        assert!(!evaluate_native(&expr, &vars(&[("x", json!(3))])));
    }

    /// **Scenario**: A missing variable compares as null: Gt is false,
    /// Exists is false, IsEmpty is true.
    #[test]
    fn missing_variable_is_null() {
        let empty = HashMap::new();
        assert!(!evaluate_native(&ConditionExpr::gt("x", json!(1)), &empty));
        assert!(!evaluate_native(&ConditionExpr::exists("x"), &empty));
        assert!(evaluate_native(
            &ConditionExpr::compare("x", CompareOp::IsEmpty, Value::Null),
            &empty
        ));
    }

    /// **Scenario**: All/Any/Not combine; empty All is true.
    #[test]
    fn logical_combinators() {
        let v = vars(&[("a", json!(1)), ("b", json!(2))]);
        let both = ConditionExpr::All(vec![
            ConditionExpr::eq("a", json!(1)),
            ConditionExpr::eq("b", json!(2)),
        ]);
        assert!(evaluate_native(&both, &v));

        let either = ConditionExpr::Any(vec![
            ConditionExpr::eq("a", json!(9)),
            ConditionExpr::eq("b", json!(2)),
        ]);
        assert!(evaluate_native(&either, &v));

        assert!(evaluate_native(&ConditionExpr::always(), &v));
        assert!(!evaluate_native(
            &ConditionExpr::not(ConditionExpr::always()),
            &v
        ));
    }

    /// **Scenario**: Contains works on both strings and arrays.
    #[test]
    fn contains_string_and_array() {
        let v = vars(&[
            ("s", json!("hello world")),
            ("a", json!(["x", "y"])),
        ]);
        assert!(evaluate_native(
            &ConditionExpr::compare("s", CompareOp::Contains, json!("world")),
            &v
        ));
        assert!(evaluate_native(
            &ConditionExpr::compare("a", CompareOp::Contains, json!("y")),
            &v
        ));
        assert!(!evaluate_native(
            &ConditionExpr::compare("a", CompareOp::Contains, json!("z")),
            &v
        ));
    }

    /// **Scenario**: Evaluating External with no backend configured returns
    /// EvalError::NoBackend instead of a silent default.
    #[tokio::test]
    async fn external_without_backend_errors() {
        let expr = ConditionExpr::external("x > 5");
        let result = evaluate(&expr, &HashMap::new(), None).await;
        assert!(matches!(result, Err(EvalError::NoBackend(_))));
    }

    /// **Scenario**: External delegates to the backend and reduces the
    /// returned value by truthiness.
    #[tokio::test]
    async fn external_delegates_to_backend() {
        struct FixedBackend(Value);

        #[async_trait]
        impl ConditionBackend for FixedBackend {
            async fn evaluate(
                &self,
                _expression: &str,
                _variables: &HashMap<String, Value>,
            ) -> Result<Value, EvalError> {
                Ok(self.0.clone())
            }
        }

        let expr = ConditionExpr::external("anything");
        let truthy = FixedBackend(json!(1));
        assert!(evaluate(&expr, &HashMap::new(), Some(&truthy)).await.unwrap());
        let falsy = FixedBackend(json!(""));
        assert!(!evaluate(&expr, &HashMap::new(), Some(&falsy)).await.unwrap());
    }

    /// **Scenario**: An External nested under Not/All/Any still reaches the
    /// backend; the combinators never default it to false.
    #[tokio::test]
    async fn nested_external_consults_backend() {
        use std::sync::atomic::{AtomicU32, Ordering};

        struct CountingBackend(AtomicU32);

        #[async_trait]
        impl ConditionBackend for CountingBackend {
            async fn evaluate(
                &self,
                _expression: &str,
                _variables: &HashMap<String, Value>,
            ) -> Result<Value, EvalError> {
                self.0.fetch_add(1, Ordering::Relaxed);
                Ok(json!(true))
            }
        }

        let backend = CountingBackend(AtomicU32::new(0));
        let vars = HashMap::new();

        let expr = ConditionExpr::not(ConditionExpr::external("always_true"));
        assert!(!evaluate(&expr, &vars, Some(&backend)).await.unwrap());
        assert_eq!(backend.0.load(Ordering::Relaxed), 1);

        let expr = ConditionExpr::All(vec![
            ConditionExpr::always(),
            ConditionExpr::external("always_true"),
        ]);
        assert!(evaluate(&expr, &vars, Some(&backend)).await.unwrap());
        assert_eq!(backend.0.load(Ordering::Relaxed), 2);

        let expr = ConditionExpr::Any(vec![ConditionExpr::external("always_true")]);
        assert!(evaluate(&expr, &vars, Some(&backend)).await.unwrap());
        assert_eq!(backend.0.load(Ordering::Relaxed), 3);
    }
}
