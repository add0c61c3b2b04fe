//! The engine: executes a run in generations (topological waves).
//!
//! Each wave dispatches its eligible nodes concurrently (bounded by a
//! semaphore), then waits for all of them to reach a terminal state before
//! computing the next frontier — a hard barrier, so a join never starts
//! before every predecessor in flight has resolved. There is no
//! cross-generation parallelism.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::condition::{self, ConditionBackend};
use crate::context::ExecutionContext;
use crate::error::RunError;
use crate::event::{EventBus, RunEvent, Subscription};
use crate::executor::{
    ActionInvoker, InvokeError, NodeErrorKind, NodeExecutionError, NodeExecutor, NodeOutcome,
    SubgraphRunner,
};
use crate::graph::{Graph, Node};
use crate::persist::{RunSnapshot, RunStore};
use crate::retry::RetryPolicy;
use crate::run::{NodeState, RunResult, RunStatus};
use crate::scheduler::{CancelToken, Frontier, JoinPolicy, RunOptions};

/// Workflow engine for one graph.
///
/// Configure collaborators with the `with_*` builders, subscribe for
/// lifecycle events, then call [`run`](Self::run). The engine is cheap to
/// clone (all shared state is behind `Arc`s) and a single instance may
/// drive multiple runs concurrently.
#[derive(Clone)]
pub struct Engine {
    graph: Arc<Graph>,
    invoker: Option<Arc<dyn ActionInvoker>>,
    backend: Option<Arc<dyn ConditionBackend>>,
    bus: Arc<EventBus>,
    store: Option<Arc<dyn RunStore>>,
    run_seq: Arc<AtomicU64>,
}

impl Engine {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph: Arc::new(graph),
            invoker: None,
            backend: None,
            bus: Arc::new(EventBus::new()),
            store: None,
            run_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sets the action-invoker collaborator for Action nodes.
    pub fn with_invoker(mut self, invoker: Arc<dyn ActionInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Sets the backend for `ConditionExpr::External` expressions.
    pub fn with_condition_backend(mut self, backend: Arc<dyn ConditionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the store used to persist snapshots at suspend boundaries.
    pub fn with_run_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Registers a lifecycle-event listener.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Executes the graph with the given initial variables.
    ///
    /// Synchronous from the caller's perspective even though waves run
    /// their nodes in parallel internally. Never panics on node failure;
    /// the terminal status and first fatal error are in the result.
    pub async fn run(&self, initial: HashMap<String, Value>, options: RunOptions) -> RunResult {
        let run_id = self.next_run_id();
        let options = Arc::new(options);
        let ctx = Arc::new(ExecutionContext::new(initial, options.trace_cap));
        let frontier = Frontier::new();
        let first_wave = self.graph.start_ids().to_vec();
        self.drive(run_id, ctx, frontier, first_wave, options).await
    }

    /// Continues a suspended run from a snapshot.
    ///
    /// `resume_variables` are merged into the restored variables before the
    /// suspended nodes re-run (typically the external input the suspension
    /// was waiting for).
    pub async fn resume(
        &self,
        snapshot: RunSnapshot,
        resume_variables: HashMap<String, Value>,
        options: RunOptions,
    ) -> RunResult {
        if snapshot.graph != self.graph.name() {
            let error = RunError::Persist(format!(
                "snapshot belongs to graph {:?}, engine runs {:?}",
                snapshot.graph,
                self.graph.name()
            ));
            return RunResult {
                run_id: snapshot.run_id,
                status: RunStatus::Failed,
                output: Value::Null,
                outputs: BTreeMap::new(),
                node_states: HashMap::new(),
                retry_counts: HashMap::new(),
                error: Some(error),
                traces: Vec::new(),
                snapshot: None,
            };
        }

        let options = Arc::new(options);
        let mut variables = snapshot.variables;
        variables.extend(resume_variables);
        let ctx = Arc::new(ExecutionContext::new(variables, options.trace_cap));
        for (id, value) in snapshot.node_results {
            ctx.set_node_result(id, value);
        }
        for (id, state) in snapshot.node_states {
            ctx.set_node_state(id, state);
        }
        for (id, count) in snapshot.retry_counts {
            ctx.set_retry_count(id, count);
        }
        let frontier = Frontier::restore(snapshot.visited);
        self.drive(snapshot.run_id, ctx, frontier, snapshot.frontier, options)
            .await
    }

    async fn drive(
        &self,
        run_id: String,
        ctx: Arc<ExecutionContext>,
        mut frontier: Frontier,
        first_wave: Vec<String>,
        options: Arc<RunOptions>,
    ) -> RunResult {
        let deadline = Instant::now() + options.run_timeout;
        info!(run_id = %run_id, graph = %self.graph.name(), "run started");
        self.emit(
            &ctx,
            RunEvent::RunStarted {
                run_id: run_id.clone(),
                graph: self.graph.name().to_string(),
            },
        );

        let end = self
            .run_waves(
                self.graph.clone(),
                ctx.clone(),
                &mut frontier,
                first_wave,
                options.clone(),
                deadline,
                run_id.clone(),
            )
            .await;

        let (status, error, snapshot) = match end {
            WaveEnd::Drained => {
                let outputs = collect_outputs(&self.graph, &ctx);
                if outputs.is_empty() {
                    self.emit(
                        &ctx,
                        RunEvent::RunFailed {
                            run_id: run_id.clone(),
                            error: RunError::NoTerminalReached.to_string(),
                        },
                    );
                    (RunStatus::Failed, Some(RunError::NoTerminalReached), None)
                } else {
                    (RunStatus::Completed, None, None)
                }
            }
            WaveEnd::Fatal(err) => match err {
                RunError::Cancelled => {
                    self.emit(
                        &ctx,
                        RunEvent::RunCancelled {
                            run_id: run_id.clone(),
                        },
                    );
                    (RunStatus::Cancelled, Some(RunError::Cancelled), None)
                }
                other => {
                    self.emit(
                        &ctx,
                        RunEvent::RunFailed {
                            run_id: run_id.clone(),
                            error: other.to_string(),
                        },
                    );
                    (RunStatus::Failed, Some(other), None)
                }
            },
            WaveEnd::Suspended {
                node_id,
                frontier: resume_frontier,
            } => {
                let snapshot = RunSnapshot {
                    run_id: run_id.clone(),
                    graph: self.graph.name().to_string(),
                    variables: ctx.variables_snapshot(),
                    node_results: ctx.node_results_snapshot(),
                    node_states: ctx.node_states_snapshot(),
                    retry_counts: ctx.retry_counts_snapshot(),
                    visited: frontier.visited().map(str::to_string).collect(),
                    frontier: resume_frontier,
                };
                self.emit(
                    &ctx,
                    RunEvent::RunSuspended {
                        run_id: run_id.clone(),
                        node_id,
                    },
                );
                if let Some(store) = &self.store {
                    if let Err(e) = store.save_run_state(&snapshot).await {
                        warn!(run_id = %run_id, error = %e, "saving suspended run failed");
                        let error = RunError::Persist(e.to_string());
                        (RunStatus::Failed, Some(error), Some(snapshot))
                    } else {
                        (RunStatus::Suspended, None, Some(snapshot))
                    }
                } else {
                    (RunStatus::Suspended, None, Some(snapshot))
                }
            }
        };

        let outputs = if status == RunStatus::Completed {
            collect_outputs(&self.graph, &ctx)
        } else {
            BTreeMap::new()
        };
        let output = outputs
            .values()
            .next_back()
            .cloned()
            .unwrap_or(Value::Null);
        if status == RunStatus::Completed {
            self.emit(
                &ctx,
                RunEvent::RunCompleted {
                    run_id: run_id.clone(),
                    output: output.clone(),
                },
            );
        }
        info!(run_id = %run_id, ?status, "run finished");

        RunResult {
            run_id,
            status,
            output,
            outputs,
            node_states: ctx.node_states_snapshot(),
            retry_counts: ctx.retry_counts_snapshot(),
            error,
            traces: ctx.traces(),
            snapshot,
        }
    }

    /// The wave loop shared by top-level runs and loop-body sub-runs.
    #[allow(clippy::too_many_arguments)]
    async fn run_waves(
        &self,
        graph: Arc<Graph>,
        ctx: Arc<ExecutionContext>,
        frontier: &mut Frontier,
        mut wave: Vec<String>,
        options: Arc<RunOptions>,
        deadline: Instant,
        run_id: String,
    ) -> WaveEnd {
        // One bounded pool per (sub-)run. Loop-body sub-runs get their own
        // pool: a Loop node still holds its wave slot while its body runs,
        // and sharing one semaphore across nesting levels would deadlock at
        // low concurrency limits.
        let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
        let executor = Arc::new(NodeExecutor::new(self.invoker.clone(), self.backend.clone()));
        let mut wave_index: u64 = 0;

        while !wave.is_empty() {
            if options.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                return WaveEnd::Fatal(RunError::Cancelled);
            }
            if Instant::now() >= deadline {
                return WaveEnd::Fatal(RunError::DeadlineExceeded);
            }
            debug!(run_id = %run_id, wave_index, nodes = ?wave, "wave started");
            self.emit(
                &ctx,
                RunEvent::WaveStarted {
                    run_id: run_id.clone(),
                    index: wave_index,
                    nodes: wave.clone(),
                },
            );

            let mut tasks: JoinSet<TaskResult> = JoinSet::new();
            for node_id in wave.drain(..) {
                tasks.spawn(run_node(
                    self.clone(),
                    graph.clone(),
                    ctx.clone(),
                    executor.clone(),
                    options.clone(),
                    semaphore.clone(),
                    deadline,
                    node_id,
                ));
            }

            // Barrier: every node in the wave must resolve before the next
            // frontier is computed.
            let mut fatal: Option<RunError> = None;
            let mut suspended: Option<String> = None;
            let mut resolved: Vec<String> = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(task) => match task.end {
                        TaskEnd::Completed | TaskEnd::Skipped => resolved.push(task.node_id),
                        TaskEnd::Suspended => {
                            suspended.get_or_insert(task.node_id);
                        }
                        TaskEnd::Fatal(err) => {
                            resolved.push(task.node_id);
                            fatal.get_or_insert(err);
                        }
                    },
                    Err(join_err) => {
                        fatal.get_or_insert(RunError::Node(NodeExecutionError::new(
                            "<wave task>",
                            0,
                            NodeErrorKind::Invoke(InvokeError::Failed(join_err.to_string())),
                        )));
                    }
                }
            }

            for id in &resolved {
                frontier.mark_visited(id);
            }
            frontier.add_targets_of(&graph, resolved.iter().map(String::as_str));
            let next = frontier.admit(&graph, |id| {
                ctx.node_state(id).map(|s| s.is_terminal()).unwrap_or(false)
            });

            if let Some(err) = fatal {
                return WaveEnd::Fatal(err);
            }
            if let Some(node_id) = suspended {
                let mut resume = vec![node_id.clone()];
                resume.extend(next);
                return WaveEnd::Suspended {
                    node_id,
                    frontier: resume,
                };
            }

            wave = next;
            wave_index += 1;
        }
        WaveEnd::Drained
    }

    /// Runs a Loop node's body graph to completion against a child context.
    async fn drive_subgraph(
        &self,
        graph: Arc<Graph>,
        ctx: Arc<ExecutionContext>,
        deadline: Instant,
        options: Arc<RunOptions>,
    ) -> Result<Value, NodeExecutionError> {
        let mut frontier = Frontier::new();
        let first_wave = graph.start_ids().to_vec();
        let run_id = format!("body:{}", graph.name());
        let end = self
            .run_waves(
                graph.clone(),
                ctx.clone(),
                &mut frontier,
                first_wave,
                options,
                deadline,
                run_id,
            )
            .await;
        match end {
            WaveEnd::Drained => {
                let outputs = collect_outputs(&graph, &ctx);
                Ok(outputs.values().next_back().cloned().unwrap_or(Value::Null))
            }
            WaveEnd::Fatal(RunError::Node(err)) => Err(err),
            WaveEnd::Fatal(other) => Err(NodeExecutionError::new(
                graph.name(),
                0,
                NodeErrorKind::Subgraph(other.to_string()),
            )),
            WaveEnd::Suspended { node_id, .. } => Err(NodeExecutionError::new(
                graph.name(),
                0,
                NodeErrorKind::Subgraph(format!(
                    "node {node_id} suspended inside a loop body; suspension is only supported at the top level"
                )),
            )),
        }
    }

    fn emit(&self, ctx: &ExecutionContext, event: RunEvent) {
        ctx.record_trace(event.clone());
        self.bus.publish(&event);
    }

    fn next_run_id(&self) -> String {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let seq = self.run_seq.fetch_add(1, Ordering::Relaxed);
        format!("run-{ms}-{seq}")
    }
}

/// How the wave loop ended.
enum WaveEnd {
    /// Frontier drained; completion vs. NoTerminalReached is decided by
    /// whether any End node succeeded.
    Drained,
    Fatal(RunError),
    Suspended {
        node_id: String,
        /// Wave to re-enter on resume: the suspended node plus any nodes
        /// admitted by this wave's completions.
        frontier: Vec<String>,
    },
}

struct TaskResult {
    node_id: String,
    end: TaskEnd,
}

enum TaskEnd {
    Completed,
    Skipped,
    Suspended,
    Fatal(RunError),
}

/// Bridges the executor's Loop dispatch back into the engine's wave loop.
struct SubRunner {
    engine: Engine,
    options: Arc<RunOptions>,
}

#[async_trait]
impl SubgraphRunner for SubRunner {
    async fn run_subgraph(
        &self,
        graph: Arc<Graph>,
        ctx: &Arc<ExecutionContext>,
        deadline: Instant,
    ) -> Result<Value, NodeExecutionError> {
        self.engine
            .drive_subgraph(graph, ctx.clone(), deadline, self.options.clone())
            .await
    }
}

/// One node's complete lifecycle within a wave: eligibility, execution,
/// retry/fallback resolution.
#[allow(clippy::too_many_arguments)]
async fn run_node(
    engine: Engine,
    graph: Arc<Graph>,
    ctx: Arc<ExecutionContext>,
    executor: Arc<NodeExecutor>,
    options: Arc<RunOptions>,
    semaphore: Arc<Semaphore>,
    run_deadline: Instant,
    node_id: String,
) -> TaskResult {
    let _permit = semaphore
        .clone()
        .acquire_owned()
        .await
        .expect("wave semaphore never closes");
    // Build validated every edge endpoint, so the frontier only carries
    // known ids.
    let node = graph.node(&node_id).expect("validated graph has node").clone();
    let backend = executor.backend();
    let snapshot = ctx.variables_snapshot();

    // Guard check, independent of incoming edges.
    if let Some(guard) = &node.guard {
        match condition::evaluate(guard, &snapshot, backend).await {
            Ok(true) => {}
            Ok(false) => return skip(&engine, &ctx, node_id),
            Err(e) => {
                ctx.set_node_state(&node_id, NodeState::Failed);
                let err = NodeExecutionError::new(&node_id, 0, e);
                engine.emit(
                    &ctx,
                    RunEvent::NodeFailed {
                        node_id: node_id.clone(),
                        error: err.to_string(),
                        attempt: 0,
                    },
                );
                return TaskResult {
                    node_id,
                    end: TaskEnd::Fatal(err.into()),
                };
            }
        }
    }

    // Edge check: at least one incoming edge from a successful predecessor
    // whose condition holds. Start-wave nodes (no incoming edges) pass.
    let incoming: Vec<_> = graph.incoming(&node_id).collect();
    if !incoming.is_empty() {
        if options.join_policy == JoinPolicy::AllSuccess {
            let all_success = graph
                .predecessors(&node_id)
                .iter()
                .all(|p| matches!(ctx.node_state(p), Some(NodeState::Success)));
            if !all_success {
                return skip(&engine, &ctx, node_id);
            }
        }
        let mut permitted = false;
        for edge in incoming {
            if !matches!(ctx.node_state(&edge.source), Some(NodeState::Success)) {
                continue;
            }
            let holds = match &edge.condition {
                None => true,
                Some(cond) => match condition::evaluate(cond, &snapshot, backend).await {
                    Ok(b) => b,
                    Err(e) => {
                        ctx.set_node_state(&node_id, NodeState::Failed);
                        let err = NodeExecutionError::new(&node_id, 0, e);
                        engine.emit(
                            &ctx,
                            RunEvent::NodeFailed {
                                node_id: node_id.clone(),
                                error: err.to_string(),
                                attempt: 0,
                            },
                        );
                        return TaskResult {
                            node_id,
                            end: TaskEnd::Fatal(err.into()),
                        };
                    }
                },
            };
            if holds {
                permitted = true;
                break;
            }
        }
        if !permitted {
            return skip(&engine, &ctx, node_id);
        }
    }

    // Execute under the node's failure policy.
    ctx.set_node_state(&node_id, NodeState::Running);
    engine.emit(
        &ctx,
        RunEvent::NodeStarted {
            node_id: node_id.clone(),
        },
    );
    let policy = node
        .retry
        .clone()
        .unwrap_or_else(|| options.default_retry_policy.clone());
    let node_deadline = run_deadline
        .min(Instant::now() + node.timeout.unwrap_or(options.default_node_timeout));
    let subgraphs = SubRunner {
        engine: engine.clone(),
        options: options.clone(),
    };
    // Resumed runs continue from the saved attempt count.
    let mut attempt: u32 = ctx.retry_count(&node_id);

    loop {
        match execute_or_cancel(
            &executor,
            &node,
            &ctx,
            node_deadline,
            attempt,
            &subgraphs,
            options.cancel.as_ref(),
        )
        .await
        {
            Ok(NodeOutcome::Completed(value)) => {
                ctx.set_node_state(&node_id, NodeState::Success);
                engine.emit(
                    &ctx,
                    RunEvent::NodeCompleted {
                        node_id: node_id.clone(),
                        output: value,
                    },
                );
                return TaskResult {
                    node_id,
                    end: TaskEnd::Completed,
                };
            }
            Ok(NodeOutcome::Suspended) => {
                // Reset so the node re-runs on resume.
                ctx.set_node_state(&node_id, NodeState::Ready);
                return TaskResult {
                    node_id,
                    end: TaskEnd::Suspended,
                };
            }
            Err(err) => {
                ctx.set_node_state(&node_id, NodeState::Failed);
                engine.emit(
                    &ctx,
                    RunEvent::NodeFailed {
                        node_id: node_id.clone(),
                        error: err.to_string(),
                        attempt,
                    },
                );
                if err.is_cancellation() {
                    return TaskResult {
                        node_id,
                        end: TaskEnd::Fatal(RunError::Cancelled),
                    };
                }
                match &policy {
                    RetryPolicy::FailFast => {
                        return TaskResult {
                            node_id,
                            end: TaskEnd::Fatal(err.into()),
                        };
                    }
                    RetryPolicy::Retry {
                        max_attempts,
                        backoff,
                    } => {
                        if attempt + 1 >= *max_attempts {
                            return TaskResult {
                                node_id,
                                end: TaskEnd::Fatal(err.into()),
                            };
                        }
                        attempt = ctx.bump_retry(&node_id);
                        let delay = backoff.delay(attempt);
                        engine.emit(
                            &ctx,
                            RunEvent::NodeRetrying {
                                node_id: node_id.clone(),
                                attempt,
                                delay_ms: delay.as_millis() as u64,
                            },
                        );
                        match &options.cancel {
                            Some(token) => {
                                tokio::select! {
                                    _ = tokio::time::sleep(delay) => {}
                                    _ = token.cancelled() => {
                                        return TaskResult {
                                            node_id,
                                            end: TaskEnd::Fatal(RunError::Cancelled),
                                        };
                                    }
                                }
                            }
                            None => tokio::time::sleep(delay).await,
                        }
                        // Failed -> Running: the one retry-bounded re-entry
                        // the state machine allows.
                        ctx.set_node_state(&node_id, NodeState::Running);
                    }
                    RetryPolicy::Skip => {
                        return skip(&engine, &ctx, node_id);
                    }
                    RetryPolicy::Fallback { node: alt_id } => {
                        engine.emit(
                            &ctx,
                            RunEvent::NodeFellBack {
                                node_id: node_id.clone(),
                                fallback: alt_id.clone(),
                            },
                        );
                        let alt = graph
                            .node(alt_id)
                            .expect("build validated fallback target")
                            .clone();
                        match execute_or_cancel(
                            &executor,
                            &alt,
                            &ctx,
                            node_deadline,
                            0,
                            &subgraphs,
                            options.cancel.as_ref(),
                        )
                        .await
                        {
                            Ok(NodeOutcome::Completed(value)) => {
                                // Record under the original id so routing
                                // downstream of the failed node is intact.
                                // The alternate node is terminal too; a join
                                // listing it as a predecessor must admit.
                                ctx.set_node_result(&node_id, value.clone());
                                ctx.set_node_state(alt_id.as_str(), NodeState::Success);
                                ctx.set_node_state(&node_id, NodeState::Success);
                                engine.emit(
                                    &ctx,
                                    RunEvent::NodeCompleted {
                                        node_id: node_id.clone(),
                                        output: value,
                                    },
                                );
                                return TaskResult {
                                    node_id,
                                    end: TaskEnd::Completed,
                                };
                            }
                            Ok(NodeOutcome::Suspended) => {
                                ctx.set_node_state(&node_id, NodeState::Ready);
                                return TaskResult {
                                    node_id,
                                    end: TaskEnd::Suspended,
                                };
                            }
                            Err(fb_err) => {
                                ctx.set_node_state(alt_id.as_str(), NodeState::Failed);
                                return TaskResult {
                                    node_id,
                                    end: TaskEnd::Fatal(fb_err.into()),
                                };
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Runs one node attempt, racing it against run cancellation so a
/// long-running collaborator call stops promptly.
#[allow(clippy::too_many_arguments)]
async fn execute_or_cancel(
    executor: &NodeExecutor,
    node: &Node,
    ctx: &Arc<ExecutionContext>,
    deadline: Instant,
    attempt: u32,
    subgraphs: &dyn SubgraphRunner,
    cancel: Option<&CancelToken>,
) -> Result<NodeOutcome, NodeExecutionError> {
    match cancel {
        Some(token) => {
            tokio::select! {
                result = executor.execute(node, ctx, deadline, attempt, subgraphs) => result,
                _ = token.cancelled() => Err(NodeExecutionError::new(
                    &node.id,
                    attempt,
                    NodeErrorKind::Cancelled,
                )),
            }
        }
        None => executor.execute(node, ctx, deadline, attempt, subgraphs).await,
    }
}

fn skip(engine: &Engine, ctx: &ExecutionContext, node_id: String) -> TaskResult {
    ctx.set_node_state(&node_id, NodeState::Skipped);
    engine.emit(
        ctx,
        RunEvent::NodeSkipped {
            node_id: node_id.clone(),
        },
    );
    TaskResult {
        node_id,
        end: TaskEnd::Skipped,
    }
}

/// Outputs of every successful End node, keyed by End-node id.
fn collect_outputs(graph: &Graph, ctx: &ExecutionContext) -> BTreeMap<String, Value> {
    let mut outputs = BTreeMap::new();
    for end_id in graph.end_ids() {
        if matches!(ctx.node_state(end_id), Some(NodeState::Success)) {
            outputs.insert(
                end_id.to_string(),
                ctx.node_result(end_id).unwrap_or(Value::Null),
            );
        }
    }
    outputs
}
