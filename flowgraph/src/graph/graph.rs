//! Immutable workflow graph: validated nodes + edges with adjacency indexes.
//!
//! Built by `GraphBuilder::build` only; read-only afterwards, so the
//! scheduler shares it across node tasks without locking.

use std::collections::HashMap;

use crate::graph::{Edge, Node};

/// A validated, immutable workflow graph.
///
/// **Interaction**: produced by `GraphBuilder::build`; consumed by the
/// scheduler. Adjacency (outgoing/incoming edge lists, start set) is
/// precomputed at build time; queries never allocate.
#[derive(Debug)]
pub struct Graph {
    pub(super) name: String,
    pub(super) nodes: HashMap<String, Node>,
    pub(super) edges: Vec<Edge>,
    /// node id -> indexes into `edges`, in insertion order.
    pub(super) outgoing: HashMap<String, Vec<usize>>,
    pub(super) incoming: HashMap<String, Vec<usize>>,
    /// Nodes seeding the first wave: explicit Start kind, or zero incoming
    /// edges when no explicit Start exists.
    pub(super) start_ids: Vec<String>,
}

impl Graph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of the nodes that seed the first scheduling wave.
    pub fn start_ids(&self) -> &[String] {
        &self.start_ids
    }

    /// Outgoing edges of `id`, in the order they were added.
    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &Edge> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    /// Incoming edges of `id`, in the order they were added.
    pub fn incoming(&self, id: &str) -> impl Iterator<Item = &Edge> {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    /// Distinct predecessor ids of `id` (a join waits on all of them).
    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        let mut seen = Vec::new();
        for edge in self.incoming(id) {
            if !seen.contains(&edge.source.as_str()) {
                seen.push(edge.source.as_str());
            }
        }
        seen
    }

    /// Ids of all End nodes; their resolved outputs form the run output.
    pub fn end_ids(&self) -> Vec<&str> {
        self.nodes
            .values()
            .filter(|n| n.is_end())
            .map(|n| n.id.as_str())
            .collect()
    }
}
