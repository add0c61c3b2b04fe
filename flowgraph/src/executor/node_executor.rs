//! Node executor: kind-dispatched execution of a single node attempt.
//!
//! Start/End/Condition/Action are executed directly; Loop bodies go back
//! through the [`SubgraphRunner`] the scheduler passes in, so the executor
//! never owns the scheduler. All collaborator failures come back as a typed
//! [`NodeExecutionError`]; nothing panics past this boundary.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::condition::{self, ConditionBackend};
use crate::context::ExecutionContext;
use crate::executor::{ActionInvoker, ActionOutcome, NodeErrorKind, NodeExecutionError};
use crate::graph::{ActionConfig, Graph, LoopConfig, Node, NodeKind};

/// Result of one node attempt.
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    /// The node reached Success; carries the recorded node-result value.
    Completed(Value),
    /// An action signalled suspension; the run snapshots and stops after
    /// the current wave.
    Suspended,
}

/// Executes a nested sub-graph on behalf of a Loop node.
///
/// Implemented by the scheduler; injected per call so the executor stays
/// free of scheduler state.
#[async_trait]
pub trait SubgraphRunner: Send + Sync {
    /// Runs `graph` against `ctx` and returns the sub-run's output value.
    async fn run_subgraph(
        &self,
        graph: Arc<Graph>,
        ctx: &Arc<ExecutionContext>,
        deadline: Instant,
    ) -> Result<Value, NodeExecutionError>;
}

/// Kind-dispatched node execution.
///
/// **Interaction**: owned by the scheduler; one `execute` call is one
/// attempt of one node. Retry/fallback resolution lives in the scheduler.
pub struct NodeExecutor {
    invoker: Option<Arc<dyn ActionInvoker>>,
    backend: Option<Arc<dyn ConditionBackend>>,
}

impl NodeExecutor {
    pub fn new(
        invoker: Option<Arc<dyn ActionInvoker>>,
        backend: Option<Arc<dyn ConditionBackend>>,
    ) -> Self {
        Self { invoker, backend }
    }

    pub fn backend(&self) -> Option<&dyn ConditionBackend> {
        self.backend.as_deref()
    }

    /// Executes one attempt of `node` against `ctx`, bounded by `deadline`.
    ///
    /// On success the node result is already written to the context (and,
    /// for Action/Condition/Loop, merged into variables under the node-id
    /// prefix).
    pub async fn execute(
        &self,
        node: &Node,
        ctx: &Arc<ExecutionContext>,
        deadline: Instant,
        attempt: u32,
        subgraphs: &dyn SubgraphRunner,
    ) -> Result<NodeOutcome, NodeExecutionError> {
        debug!(node_id = %node.id, attempt, "executing node");
        match &node.kind {
            NodeKind::Start => {
                ctx.set_node_result(&node.id, Value::Null);
                Ok(NodeOutcome::Completed(Value::Null))
            }
            NodeKind::End { output } => {
                let value = match output {
                    Some(key) => ctx.get(key).unwrap_or(Value::Null),
                    None => {
                        Value::Object(ctx.variables_snapshot().into_iter().collect())
                    }
                };
                ctx.set_node_result(&node.id, value.clone());
                Ok(NodeOutcome::Completed(value))
            }
            NodeKind::Condition { expr } => {
                let snapshot = ctx.variables_snapshot();
                let holds = condition::evaluate(expr, &snapshot, self.backend.as_deref())
                    .await
                    .map_err(|e| NodeExecutionError::new(&node.id, attempt, e))?;
                ctx.set_node_result(&node.id, Value::Bool(holds));
                ctx.set(format!("{}.result", node.id), Value::Bool(holds));
                Ok(NodeOutcome::Completed(Value::Bool(holds)))
            }
            NodeKind::Action(cfg) => self.execute_action(node, cfg, ctx, deadline, attempt).await,
            NodeKind::Loop(cfg) => {
                self.execute_loop(node, cfg, ctx, deadline, attempt, subgraphs)
                    .await
            }
        }
    }

    async fn execute_action(
        &self,
        node: &Node,
        cfg: &ActionConfig,
        ctx: &Arc<ExecutionContext>,
        deadline: Instant,
        attempt: u32,
    ) -> Result<NodeOutcome, NodeExecutionError> {
        let invoker = self
            .invoker
            .as_ref()
            .ok_or_else(|| NodeExecutionError::new(&node.id, attempt, NodeErrorKind::NoInvoker))?;

        let mut inputs: HashMap<String, Value> = HashMap::with_capacity(cfg.inputs.len());
        for (param, variable) in &cfg.inputs {
            inputs.insert(param.clone(), ctx.get(variable).unwrap_or(Value::Null));
        }

        let outcome = tokio::time::timeout_at(deadline, invoker.invoke(&cfg.action, inputs, deadline))
            .await
            .map_err(|_| NodeExecutionError::new(&node.id, attempt, NodeErrorKind::Timeout))?
            .map_err(|e| NodeExecutionError::new(&node.id, attempt, e))?;

        match outcome {
            ActionOutcome::Output(outputs) => {
                for (key, value) in &outputs {
                    ctx.set(format!("{}.{}", node.id, key), value.clone());
                }
                let result = Value::Object(outputs.into_iter().collect());
                ctx.set_node_result(&node.id, result.clone());
                Ok(NodeOutcome::Completed(result))
            }
            ActionOutcome::Suspend => Ok(NodeOutcome::Suspended),
        }
    }

    async fn execute_loop(
        &self,
        node: &Node,
        cfg: &LoopConfig,
        ctx: &Arc<ExecutionContext>,
        deadline: Instant,
        attempt: u32,
        subgraphs: &dyn SubgraphRunner,
    ) -> Result<NodeOutcome, NodeExecutionError> {
        let max = cfg.max_iterations.unwrap_or(u32::MAX);
        let mut items: Vec<Value> = Vec::new();

        for iteration in 0..max {
            if Instant::now() >= deadline {
                return Err(NodeExecutionError::new(
                    &node.id,
                    attempt,
                    NodeErrorKind::Timeout,
                ));
            }

            let child = Arc::new(ctx.fork());
            child.set(format!("{}.index", node.id), Value::from(iteration));
            let out = subgraphs
                .run_subgraph(cfg.body.clone(), &child, deadline)
                .await
                .map_err(|inner| {
                    NodeExecutionError::new(
                        &node.id,
                        attempt,
                        NodeErrorKind::Subgraph(inner.to_string()),
                    )
                })?;
            ctx.merge(&child)
                .map_err(|e| NodeExecutionError::new(&node.id, attempt, e))?;
            items.push(out);
            ctx.set(
                format!("{}.iterations", node.id),
                Value::from(iteration + 1),
            );

            if let Some(until) = &cfg.until {
                let snapshot = ctx.variables_snapshot();
                let done = condition::evaluate(until, &snapshot, self.backend.as_deref())
                    .await
                    .map_err(|e| NodeExecutionError::new(&node.id, attempt, e))?;
                if done {
                    break;
                }
            }
        }

        let result = Value::Array(items);
        ctx.set(format!("{}.output", node.id), result.clone());
        ctx.set_node_result(&node.id, result.clone());
        Ok(NodeOutcome::Completed(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionExpr;
    use crate::context::DEFAULT_TRACE_CAP;
    use crate::executor::MockInvoker;
    use serde_json::json;
    use std::time::Duration;

    struct NoSubgraphs;

    #[async_trait]
    impl SubgraphRunner for NoSubgraphs {
        async fn run_subgraph(
            &self,
            _graph: Arc<Graph>,
            _ctx: &Arc<ExecutionContext>,
            _deadline: Instant,
        ) -> Result<Value, NodeExecutionError> {
            panic!("test graph has no loops")
        }
    }

    fn ctx_with(pairs: &[(&str, Value)]) -> Arc<ExecutionContext> {
        let vars = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Arc::new(ExecutionContext::new(vars, DEFAULT_TRACE_CAP))
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    /// **Scenario**: Action output is written to the node result and merged
    /// into variables under the node-id prefix.
    #[tokio::test]
    async fn action_writes_prefixed_variables() {
        let executor = NodeExecutor::new(Some(Arc::new(MockInvoker::new())), None);
        let ctx = ctx_with(&[]);
        let node = Node::new(
            "act",
            NodeKind::Action(ActionConfig::new(json!({"op": "echo", "value": "hi"}))),
        );
        let outcome = executor
            .execute(&node, &ctx, far_deadline(), 0, &NoSubgraphs)
            .await
            .unwrap();
        assert!(matches!(outcome, NodeOutcome::Completed(_)));
        assert_eq!(ctx.get("act.output"), Some(json!("hi")));
        assert_eq!(ctx.node_result("act").unwrap()["output"], json!("hi"));
    }

    /// **Scenario**: Action inputs are resolved from named context
    /// variables per the node config.
    #[tokio::test]
    async fn action_resolves_named_inputs() {
        let executor = NodeExecutor::new(Some(Arc::new(MockInvoker::new())), None);
        let ctx = ctx_with(&[("greeting", json!("hello"))]);
        let node = Node::new(
            "act",
            NodeKind::Action(
                ActionConfig::new(json!({"op": "echo", "value": 1}))
                    .with_input("text", "greeting"),
            ),
        );
        executor
            .execute(&node, &ctx, far_deadline(), 0, &NoSubgraphs)
            .await
            .unwrap();
        // The mock echoes inputs back into its outputs.
        assert_eq!(ctx.get("act.text"), Some(json!("hello")));
    }

    /// **Scenario**: An Action node without a configured invoker fails with
    /// NoInvoker instead of panicking.
    #[tokio::test]
    async fn action_without_invoker_errors() {
        let executor = NodeExecutor::new(None, None);
        let ctx = ctx_with(&[]);
        let node = Node::new("act", NodeKind::Action(ActionConfig::new(json!({}))));
        let err = executor
            .execute(&node, &ctx, far_deadline(), 0, &NoSubgraphs)
            .await
            .expect_err("no invoker");
        assert!(matches!(err.kind, NodeErrorKind::NoInvoker));
    }

    /// **Scenario**: A slow action overruns its deadline and fails with
    /// Timeout.
    #[tokio::test(start_paused = true)]
    async fn action_times_out_at_deadline() {
        let executor = NodeExecutor::new(Some(Arc::new(MockInvoker::new())), None);
        let ctx = ctx_with(&[]);
        let node = Node::new(
            "slow",
            NodeKind::Action(ActionConfig::new(json!({"op": "sleep_ms", "n": 60_000}))),
        );
        let deadline = Instant::now() + Duration::from_millis(10);
        let err = executor
            .execute(&node, &ctx, deadline, 0, &NoSubgraphs)
            .await
            .expect_err("times out");
        assert!(matches!(
            err.kind,
            NodeErrorKind::Timeout | NodeErrorKind::Invoke(_)
        ));
    }

    /// **Scenario**: Condition node records its boolean in the node result
    /// and in "<id>.result"; it never routes by itself.
    #[tokio::test]
    async fn condition_records_boolean() {
        let executor = NodeExecutor::new(None, None);
        let ctx = ctx_with(&[("x", json!(10))]);
        let node = Node::new(
            "check",
            NodeKind::Condition {
                expr: ConditionExpr::gt("x", json!(5)),
            },
        );
        let outcome = executor
            .execute(&node, &ctx, far_deadline(), 0, &NoSubgraphs)
            .await
            .unwrap();
        assert!(matches!(outcome, NodeOutcome::Completed(Value::Bool(true))));
        assert_eq!(ctx.get("check.result"), Some(json!(true)));
        assert_eq!(ctx.node_result("check"), Some(json!(true)));
    }

    /// **Scenario**: End node resolves its configured output variable.
    #[tokio::test]
    async fn end_resolves_output_variable() {
        let executor = NodeExecutor::new(None, None);
        let ctx = ctx_with(&[("act.output", json!("hi"))]);
        let node = Node::new(
            "end",
            NodeKind::End {
                output: Some("act.output".to_string()),
            },
        );
        let outcome = executor
            .execute(&node, &ctx, far_deadline(), 0, &NoSubgraphs)
            .await
            .unwrap();
        assert!(matches!(outcome, NodeOutcome::Completed(v) if v == json!("hi")));
    }

    /// **Scenario**: Suspension from the invoker surfaces as
    /// NodeOutcome::Suspended, not an error.
    #[tokio::test]
    async fn action_suspend_surfaces() {
        let executor = NodeExecutor::new(Some(Arc::new(MockInvoker::new())), None);
        let ctx = ctx_with(&[]);
        let node = Node::new(
            "wait",
            NodeKind::Action(
                ActionConfig::new(json!({"op": "await_input", "param": "answer"}))
                    .with_input("answer", "answer"),
            ),
        );
        let outcome = executor
            .execute(&node, &ctx, far_deadline(), 0, &NoSubgraphs)
            .await
            .unwrap();
        assert!(matches!(outcome, NodeOutcome::Suspended));
    }
}
