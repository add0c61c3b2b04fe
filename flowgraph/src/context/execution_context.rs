//! Execution context: the one mutable object shared across a run.
//!
//! Variables, node results, node states, and retry counts live in dashmaps
//! so concurrent node executions within a wave never contend on a single
//! lock. Variable values carry a version stamp from a counter shared across
//! the fork tree; merge-conflict detection compares versions recorded at
//! fork time against the parent's current ones.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde_json::Value;

use crate::context::ContextMergeConflict;
use crate::event::RunEvent;
use crate::run::NodeState;

/// Default trace-ring capacity; older entries are dropped, never the run.
pub const DEFAULT_TRACE_CAP: usize = 1024;

#[derive(Debug, Clone)]
struct Versioned {
    value: Value,
    version: u64,
}

/// Scoped key/value store for one run (or one forked branch of it).
///
/// **Interaction**: created by the scheduler at run start; forked for loop
/// iterations and parallel branches; node executors read and write through
/// the synchronized accessors. Reads on a child fall through to the parent
/// chain; writes stay local until [`merge`](Self::merge).
pub struct ExecutionContext {
    parent: Option<Arc<ExecutionContext>>,
    vars: DashMap<String, Versioned>,
    /// Parent-chain key versions captured at fork time (empty on the root).
    forked_at: HashMap<String, u64>,
    node_results: DashMap<String, Value>,
    node_states: DashMap<String, NodeState>,
    retry_counts: DashMap<String, u32>,
    traces: Mutex<VecDeque<RunEvent>>,
    trace_cap: usize,
    /// Version clock shared across the whole fork tree.
    clock: Arc<AtomicU64>,
}

impl ExecutionContext {
    /// Root context for a run, seeded with the caller's initial variables.
    pub fn new(initial: HashMap<String, Value>, trace_cap: usize) -> Self {
        let clock = Arc::new(AtomicU64::new(0));
        let vars = DashMap::new();
        for (k, v) in initial {
            vars.insert(
                k,
                Versioned {
                    value: v,
                    version: clock.fetch_add(1, Ordering::Relaxed) + 1,
                },
            );
        }
        Self {
            parent: None,
            vars,
            forked_at: HashMap::new(),
            node_results: DashMap::new(),
            node_states: DashMap::new(),
            retry_counts: DashMap::new(),
            traces: Mutex::new(VecDeque::new()),
            trace_cap,
            clock,
        }
    }

    /// Reads a variable; child reads fall through to the parent chain.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(v) = self.vars.get(key) {
            return Some(v.value.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(key))
    }

    /// Writes a variable. Last writer wins; safe under concurrent calls.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let version = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        self.vars.insert(key.into(), Versioned { value, version });
    }

    pub fn node_result(&self, node_id: &str) -> Option<Value> {
        self.node_results.get(node_id).map(|v| v.clone())
    }

    pub fn set_node_result(&self, node_id: impl Into<String>, value: Value) {
        self.node_results.insert(node_id.into(), value);
    }

    pub fn node_state(&self, node_id: &str) -> Option<NodeState> {
        self.node_states.get(node_id).map(|s| *s)
    }

    pub fn set_node_state(&self, node_id: impl Into<String>, state: NodeState) {
        self.node_states.insert(node_id.into(), state);
    }

    pub fn retry_count(&self, node_id: &str) -> u32 {
        self.retry_counts.get(node_id).map(|c| *c).unwrap_or(0)
    }

    /// Increments and returns the attempt count for `node_id`.
    pub fn bump_retry(&self, node_id: &str) -> u32 {
        let mut entry = self.retry_counts.entry(node_id.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn set_retry_count(&self, node_id: impl Into<String>, count: u32) {
        self.retry_counts.insert(node_id.into(), count);
    }

    /// Appends to the bounded trace ring. Never fails; once the ring is at
    /// capacity the oldest entry is dropped.
    pub fn record_trace(&self, event: RunEvent) {
        let mut traces = self.traces.lock().expect("trace lock poisoned");
        if traces.len() >= self.trace_cap {
            traces.pop_front();
        }
        traces.push_back(event);
    }

    /// Snapshot of the trace ring, oldest first.
    pub fn traces(&self) -> Vec<RunEvent> {
        self.traces
            .lock()
            .expect("trace lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Copy-on-write child: reads fall through to `self`, writes are local
    /// until merged. Records current key versions for conflict detection.
    pub fn fork(self: &Arc<Self>) -> ExecutionContext {
        let mut forked_at = HashMap::new();
        self.collect_versions(&mut forked_at);
        ExecutionContext {
            parent: Some(self.clone()),
            vars: DashMap::new(),
            forked_at,
            node_results: DashMap::new(),
            node_states: DashMap::new(),
            retry_counts: DashMap::new(),
            traces: Mutex::new(VecDeque::new()),
            trace_cap: self.trace_cap,
            clock: self.clock.clone(),
        }
    }

    /// Applies a child's local writes back into `self`.
    ///
    /// A key the parent rewrote since the fork conflicts unless the parent's
    /// current value equals the child's — which makes re-merging the same
    /// child with no intervening writes a no-op (idempotent).
    pub fn merge(&self, child: &ExecutionContext) -> Result<(), ContextMergeConflict> {
        for entry in child.vars.iter() {
            let key = entry.key();
            let forked_version = child.forked_at.get(key).copied().unwrap_or(0);
            if let Some(current) = self.vars.get(key) {
                if current.version != forked_version && current.value != entry.value().value {
                    return Err(ContextMergeConflict { key: key.clone() });
                }
                if current.value == entry.value().value {
                    continue;
                }
            }
            self.set(key.clone(), entry.value().value.clone());
        }
        Ok(())
    }

    /// Flattened view of all visible variables (parent chain + local),
    /// handed to condition evaluation and action invokers.
    pub fn variables_snapshot(&self) -> HashMap<String, Value> {
        let mut snapshot = match &self.parent {
            Some(p) => p.variables_snapshot(),
            None => HashMap::new(),
        };
        for entry in self.vars.iter() {
            snapshot.insert(entry.key().clone(), entry.value().value.clone());
        }
        snapshot
    }

    pub fn node_states_snapshot(&self) -> HashMap<String, NodeState> {
        self.node_states
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    pub fn node_results_snapshot(&self) -> HashMap<String, Value> {
        self.node_results
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn retry_counts_snapshot(&self) -> HashMap<String, u32> {
        self.retry_counts
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    fn collect_versions(&self, out: &mut HashMap<String, u64>) {
        if let Some(p) = &self.parent {
            p.collect_versions(out);
        }
        for entry in self.vars.iter() {
            out.insert(entry.key().clone(), entry.value().version);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root() -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::new(HashMap::new(), DEFAULT_TRACE_CAP))
    }

    /// **Scenario**: set/get round-trips; last writer wins.
    #[test]
    fn set_get_last_writer_wins() {
        let ctx = root();
        ctx.set("x", json!(1));
        ctx.set("x", json!(2));
        assert_eq!(ctx.get("x"), Some(json!(2)));
        assert_eq!(ctx.get("missing"), None);
    }

    /// **Scenario**: Child reads fall through to the parent; child writes
    /// stay invisible to the parent until merge.
    #[test]
    fn fork_reads_through_writes_local() {
        let parent = root();
        parent.set("a", json!("from-parent"));
        let child = parent.fork();
        assert_eq!(child.get("a"), Some(json!("from-parent")));
        child.set("b", json!("from-child"));
        assert_eq!(parent.get("b"), None);
        parent.merge(&child).expect("no conflict");
        assert_eq!(parent.get("b"), Some(json!("from-child")));
    }

    /// **Scenario**: Parent rewrites a key after the fork with a different
    /// value than the child wrote; merge raises ContextMergeConflict.
    #[test]
    fn merge_conflict_on_parent_rewrite() {
        let parent = root();
        parent.set("k", json!(1));
        let child = parent.fork();
        child.set("k", json!(2));
        parent.set("k", json!(3));
        let err = parent.merge(&child).expect_err("conflicting write");
        assert_eq!(err.key, "k");
    }

    /// **Scenario**: Merging the same child twice with no intervening writes
    /// yields the same parent state as merging once.
    #[test]
    fn merge_is_idempotent_for_non_conflicting_keys() {
        let parent = root();
        parent.set("base", json!(0));
        let child = parent.fork();
        child.set("out", json!("v"));
        parent.merge(&child).expect("first merge");
        let after_first = parent.variables_snapshot();
        parent.merge(&child).expect("second merge is a no-op");
        assert_eq!(parent.variables_snapshot(), after_first);
    }

    /// **Scenario**: Two sibling children writing disjoint keys both merge
    /// cleanly; a shared key with equal values also merges.
    #[test]
    fn sibling_merges_disjoint_keys() {
        let parent = root();
        let a = parent.fork();
        let b = parent.fork();
        a.set("left", json!(1));
        b.set("right", json!(2));
        parent.merge(&a).expect("left merges");
        parent.merge(&b).expect("right merges");
        assert_eq!(parent.get("left"), Some(json!(1)));
        assert_eq!(parent.get("right"), Some(json!(2)));
    }

    /// **Scenario**: Trace ring drops the oldest entries beyond its cap.
    #[test]
    fn trace_ring_is_bounded() {
        let ctx = ExecutionContext::new(HashMap::new(), 3);
        for i in 0..5 {
            ctx.record_trace(RunEvent::NodeStarted {
                node_id: format!("n{i}"),
            });
        }
        let traces = ctx.traces();
        assert_eq!(traces.len(), 3);
        assert_eq!(traces[0].node_id(), Some("n2"));
        assert_eq!(traces[2].node_id(), Some("n4"));
    }

    /// **Scenario**: Retry counts bump per node id and snapshot cleanly.
    #[test]
    fn retry_counts_bump() {
        let ctx = root();
        assert_eq!(ctx.retry_count("n"), 0);
        assert_eq!(ctx.bump_retry("n"), 1);
        assert_eq!(ctx.bump_retry("n"), 2);
        assert_eq!(ctx.retry_counts_snapshot().get("n"), Some(&2));
    }

    /// **Scenario**: Concurrent writers on different keys do not lose
    /// updates (dashmap-backed accessors).
    #[tokio::test]
    async fn concurrent_writes_are_safe() {
        let ctx = root();
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let ctx = ctx.clone();
            tasks.spawn(async move {
                ctx.set(format!("k{i}"), json!(i));
            });
        }
        while tasks.join_next().await.is_some() {}
        for i in 0..16 {
            assert_eq!(ctx.get(&format!("k{i}")), Some(json!(i)));
        }
    }
}
