//! Node: identity, kind, guard, and per-node execution knobs.
//!
//! Nodes are immutable once the graph is built. The kind is a closed tagged
//! set dispatched by the executor; extensibility happens behind the
//! `ActionInvoker` collaborator, not by adding trait hierarchies.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::condition::ConditionExpr;
use crate::graph::Graph;
use crate::retry::RetryPolicy;

/// One node of a workflow graph.
///
/// Built with [`Node::new`] plus the `with_*` setters, then registered via
/// `GraphBuilder::add_node`. `id` must be unique within its graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    /// Node-local condition gating eligibility, independent of incoming edges.
    pub guard: Option<ConditionExpr>,
    /// Per-node failure strategy; falls back to `RunOptions::default_retry_policy`.
    pub retry: Option<RetryPolicy>,
    /// Per-node execution timeout; falls back to `RunOptions::default_node_timeout`.
    pub timeout: Option<Duration>,
}

impl Node {
    /// Creates a node with the given id and kind; `name` defaults to the id.
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            guard: None,
            retry: None,
            timeout: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_guard(mut self, guard: ConditionExpr) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether this node terminates a path (End nodes collect run outputs).
    pub fn is_end(&self) -> bool {
        matches!(self.kind, NodeKind::End { .. })
    }

    pub fn is_start(&self) -> bool {
        matches!(self.kind, NodeKind::Start)
    }
}

/// Closed set of node kinds dispatched by the executor.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Entry marker; no-op. Start nodes seed the first scheduling wave.
    Start,
    /// Exit marker; resolves `output` (a variable key) as a run output.
    /// With no key, the full variable snapshot becomes the output.
    End { output: Option<String> },
    /// Exactly one external-collaborator call through the `ActionInvoker`.
    Action(ActionConfig),
    /// Evaluates an expression and records the boolean for outgoing edges
    /// to route on. The node itself never chooses the next node.
    Condition { expr: ConditionExpr },
    /// Runs a body sub-graph per iteration against a forked child context.
    Loop(LoopConfig),
}

/// Configuration for an [`NodeKind::Action`] node.
///
/// `action` is an opaque payload handed to the invoker; `inputs` maps
/// invoker parameter names to context variable keys resolved at call time.
#[derive(Debug, Clone)]
pub struct ActionConfig {
    pub action: Value,
    pub inputs: BTreeMap<String, String>,
}

impl ActionConfig {
    pub fn new(action: Value) -> Self {
        Self {
            action,
            inputs: BTreeMap::new(),
        }
    }

    /// Binds invoker parameter `param` to context variable `variable`.
    pub fn with_input(mut self, param: impl Into<String>, variable: impl Into<String>) -> Self {
        self.inputs.insert(param.into(), variable.into());
        self
    }
}

/// Configuration for an [`NodeKind::Loop`] node.
///
/// At least one of `max_iterations` / `until` must be set; the builder
/// rejects unbounded loops at graph construction.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Body executed once per iteration, in a forked child context.
    pub body: Arc<Graph>,
    /// Hard iteration cap.
    pub max_iterations: Option<u32>,
    /// Stop condition, checked against the parent context after each
    /// iteration's merge; terminates when it evaluates true.
    pub until: Option<ConditionExpr>,
}

impl LoopConfig {
    pub fn new(body: Arc<Graph>) -> Self {
        Self {
            body,
            max_iterations: None,
            until: None,
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn with_until(mut self, until: ConditionExpr) -> Self {
        self.until = Some(until);
        self
    }
}
