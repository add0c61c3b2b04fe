//! # Flowgraph
//!
//! A graph-based workflow engine. Workflows are directed graphs of typed
//! nodes (Start, End, Action, Condition, Loop) connected by optionally
//! conditional edges; the engine executes them in **generations**: each wave
//! runs every eligible node concurrently, waits for all of them, then
//! computes the next frontier. Joins admit once every predecessor is
//! terminal, even across waves.
//!
//! ## Design Principles
//!
//! - **Opaque actions**: Action nodes carry an arbitrary JSON payload; the
//!   engine hands it to an [`ActionInvoker`] and never interprets it. LLM
//!   calls, HTTP, scripts — all live behind that one seam.
//! - **Copy-on-write context**: one [`ExecutionContext`] per run; loop
//!   iterations fork a child view and merge back with conflict detection.
//! - **Policy-resolved failure**: every node failure resolves through a
//!   [`RetryPolicy`] (fail-fast, retry with backoff, skip, fallback node)
//!   before it can abort the run.
//! - **Suspend/resume**: an action can suspend the run; the engine writes a
//!   [`RunSnapshot`] through the [`RunStore`] seam and resumes from it later.
//!
//! ## Main Modules
//!
//! - [`graph`]: `Graph`, `GraphBuilder`, `Node`, `Edge` — build and validate
//!   workflow graphs.
//! - [`scheduler`]: `Engine`, `RunOptions`, `CancelToken` — execute them.
//! - [`context`]: the copy-on-write variable store.
//! - [`condition`]: the condition expression tree and evaluator.
//! - [`executor`]: node dispatch and the `ActionInvoker` seam.
//! - [`event`]: lifecycle events and the in-process event bus.
//! - [`persist`]: snapshots and the `RunStore` seam.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use serde_json::json;
//! use flowgraph::{
//!     ActionConfig, Engine, GraphBuilder, MockInvoker, Node, NodeKind, RunOptions,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut builder = GraphBuilder::new("hello");
//! builder.add_node(Node::new("start", NodeKind::Start));
//! builder.add_node(Node::new(
//!     "greet",
//!     NodeKind::Action(
//!         ActionConfig::new(json!({"op": "echo", "value": "hello"})).with_input("who", "who"),
//!     ),
//! ));
//! builder.add_node(Node::new("end", NodeKind::End { output: Some("greet.output".into()) }));
//! builder.add_edge("start", "greet");
//! builder.add_edge("greet", "end");
//! let graph = builder.build().unwrap();
//!
//! let engine = Engine::new(graph).with_invoker(Arc::new(MockInvoker::new()));
//! let initial = HashMap::from([("who".to_string(), json!("world"))]);
//! let result = engine.run(initial, RunOptions::default()).await;
//! println!("{:?} -> {}", result.status, result.output);
//! # }
//! ```

pub mod condition;
pub mod context;
pub mod error;
pub mod event;
pub mod executor;
pub mod graph;
pub mod persist;
pub mod retry;
pub mod run;
pub mod scheduler;

pub use condition::{CompareOp, ConditionBackend, ConditionExpr, EvalError};
pub use context::{ContextMergeConflict, ExecutionContext};
pub use error::RunError;
pub use event::{EventBus, RunEvent, Subscription};
pub use executor::{
    ActionInvoker, ActionOutcome, InvokeError, MockInvoker, NodeErrorKind, NodeExecutionError,
};
pub use graph::{
    ActionConfig, Edge, Graph, GraphBuilder, GraphValidationError, LoopConfig, Node, NodeKind,
};
pub use persist::{InMemoryRunStore, PersistError, RunSnapshot, RunStore};
pub use retry::{Backoff, RetryPolicy};
pub use run::{NodeState, RunResult, RunStatus};
pub use scheduler::{CancelToken, Engine, JoinPolicy, RunOptions};
