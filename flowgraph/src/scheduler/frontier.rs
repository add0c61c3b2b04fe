//! Frontier bookkeeping: visited set, pending join candidates, admission.
//!
//! A node becomes a candidate as soon as any predecessor reaches a terminal
//! state in a wave; it is admitted into a frontier only once *all* of its
//! declared predecessors are terminal, even when that spans several
//! generations. A node is admitted at most once per run.

use std::collections::{BTreeSet, HashSet};

use crate::graph::Graph;

/// Tracks which nodes have resolved and which are waiting on predecessors.
#[derive(Debug, Default)]
pub struct Frontier {
    visited: HashSet<String>,
    /// Candidates with at least one terminal predecessor, not yet admitted.
    /// Ordered for deterministic wave composition.
    pending: BTreeSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds tracking state from a resume snapshot.
    pub fn restore(visited: impl IntoIterator<Item = String>) -> Self {
        Self {
            visited: visited.into_iter().collect(),
            pending: BTreeSet::new(),
        }
    }

    /// Marks `id` terminal for this run.
    pub fn mark_visited(&mut self, id: &str) {
        self.visited.insert(id.to_string());
    }

    pub fn is_visited(&self, id: &str) -> bool {
        self.visited.contains(id)
    }

    pub fn visited(&self) -> impl Iterator<Item = &str> {
        self.visited.iter().map(String::as_str)
    }

    /// Registers the targets of every edge out of `resolved` as candidates
    /// (completed or skipped nodes alike; skip propagation needs both).
    pub fn add_targets_of<'a>(
        &mut self,
        graph: &Graph,
        resolved: impl IntoIterator<Item = &'a str>,
    ) {
        for id in resolved {
            for edge in graph.outgoing(id) {
                if !self.visited.contains(&edge.target) {
                    self.pending.insert(edge.target.clone());
                }
            }
        }
    }

    /// Admits every pending candidate whose predecessors are all terminal,
    /// removing them from the pending set. `is_terminal` is consulted per
    /// predecessor id.
    pub fn admit(&mut self, graph: &Graph, is_terminal: impl Fn(&str) -> bool) -> Vec<String> {
        let ready: Vec<String> = self
            .pending
            .iter()
            .filter(|id| graph.predecessors(id).iter().all(|p| is_terminal(p)))
            .cloned()
            .collect();
        for id in &ready {
            self.pending.remove(id);
            // Admission is the single per-run visit; loop bodies run in
            // their own Frontier.
            self.visited.insert(id.clone());
        }
        ready
    }

    /// Candidates still waiting on predecessors.
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }
}
