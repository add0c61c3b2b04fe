//! Scripted action invoker for tests.
//!
//! Behavior is driven by the action payload's `"op"` field, so one invoker
//! instance serves a whole graph of differently-configured Action nodes:
//!
//! - `{"op": "echo", "value": V}` — outputs `{"output": V}` plus the
//!   resolved inputs.
//! - `{"op": "fail"}` — always fails.
//! - `{"op": "fail_times", "n": N, "value": V}` — fails the first N calls
//!   (counted per action `"key"`, falling back to the payload text), then
//!   outputs `{"output": V}`.
//! - `{"op": "await_input", "param": P}` — suspends while input P is
//!   null/absent, outputs `{"output": <P>}` once it is supplied.
//! - `{"op": "sleep_ms", "n": N, "value": V}` — sleeps, then echoes; used
//!   for timeout and cancellation tests. Honors the deadline.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

use super::{ActionInvoker, ActionOutcome, InvokeError};

/// In-memory [`ActionInvoker`] with canned behaviors.
#[derive(Default)]
pub struct MockInvoker {
    calls: DashMap<String, u32>,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total invocations recorded under `key` (see `fail_times`).
    pub fn calls(&self, key: &str) -> u32 {
        self.calls.get(key).map(|c| *c).unwrap_or(0)
    }

    fn bump(&self, key: &str) -> u32 {
        let mut entry = self.calls.entry(key.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }
}

fn echo_output(value: &Value, inputs: HashMap<String, Value>) -> ActionOutcome {
    let mut out: HashMap<String, Value> = inputs;
    out.insert("output".to_string(), value.clone());
    ActionOutcome::Output(out)
}

#[async_trait]
impl ActionInvoker for MockInvoker {
    async fn invoke(
        &self,
        action: &Value,
        inputs: HashMap<String, Value>,
        deadline: Instant,
    ) -> Result<ActionOutcome, InvokeError> {
        let key = action
            .get("key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| action.to_string());
        let call = self.bump(&key);

        let op = action.get("op").and_then(Value::as_str).unwrap_or("echo");
        match op {
            "echo" => Ok(echo_output(action.get("value").unwrap_or(&Value::Null), inputs)),
            "fail" => Err(InvokeError::Failed("scripted failure".to_string())),
            "fail_times" => {
                let n = action.get("n").and_then(Value::as_u64).unwrap_or(0) as u32;
                if call <= n {
                    Err(InvokeError::Failed(format!("scripted failure {call}/{n}")))
                } else {
                    Ok(echo_output(action.get("value").unwrap_or(&Value::Null), inputs))
                }
            }
            "await_input" => {
                let param = action.get("param").and_then(Value::as_str).unwrap_or("input");
                let supplied = inputs.get(param).filter(|v| !v.is_null()).cloned();
                match supplied {
                    Some(v) => Ok(echo_output(&v, inputs)),
                    None => Ok(ActionOutcome::Suspend),
                }
            }
            "sleep_ms" => {
                let ms = action.get("n").and_then(Value::as_u64).unwrap_or(0);
                let wake = tokio::time::sleep(Duration::from_millis(ms));
                tokio::pin!(wake);
                tokio::select! {
                    _ = &mut wake => {
                        Ok(echo_output(action.get("value").unwrap_or(&Value::Null), inputs))
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        Err(InvokeError::DeadlineExceeded)
                    }
                }
            }
            other => Err(InvokeError::Failed(format!("unknown mock op: {other}"))),
        }
    }
}
