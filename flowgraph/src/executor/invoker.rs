//! Action-invoker collaborator contract.
//!
//! The single seam through which Action nodes reach the outside world — LLM
//! chat, HTTP calls, script engines. The core never embeds any of those
//! runtimes; it hands the invoker the node's opaque action payload, the
//! resolved inputs, and a deadline.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use super::InvokeError;

/// Result of one action invocation.
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    /// Named outputs, written to the node result and merged into variables
    /// under the node's key prefix.
    Output(HashMap<String, Value>),
    /// The action is waiting on external input; the run suspends after the
    /// current wave and can be resumed from a saved snapshot.
    Suspend,
}

/// External collaborator executing Action-node payloads.
///
/// Implementations must respect `deadline`: when it passes they return
/// `InvokeError::DeadlineExceeded` (or `Cancelled`) rather than running on.
/// The engine additionally enforces the deadline with a timeout, so a
/// misbehaving invoker cannot stall a wave past it.
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    async fn invoke(
        &self,
        action: &Value,
        inputs: HashMap<String, Value>,
        deadline: Instant,
    ) -> Result<ActionOutcome, InvokeError>;
}
