//! Graph builder: collect nodes and edges, validate, produce a `Graph`.
//!
//! All structural validation happens here — cycle detection (DFS with
//! recursion-stack coloring), reachability, dangling edges, duplicate ids,
//! loop bounds. The scheduler trusts the result and never re-checks.

use std::collections::{HashMap, HashSet};

use crate::graph::{Edge, Graph, GraphValidationError, Node, NodeKind};
use crate::retry::RetryPolicy;

/// Builder for a workflow [`Graph`].
///
/// Add nodes with `add_node`, edges with `add_edge` / `add_conditional_edge`,
/// then `build()`. Building consumes the builder; on success the graph is
/// immutable and ready to run.
pub struct GraphBuilder {
    name: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl GraphBuilder {
    /// Creates an empty builder for a graph with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Adds a node. Duplicate ids are rejected at `build()`.
    pub fn add_node(&mut self, node: Node) -> &mut Self {
        self.nodes.push(node);
        self
    }

    /// Adds an unconditional edge from `source` to `target`.
    pub fn add_edge(&mut self, source: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.edges.push(Edge::new(source, target));
        self
    }

    /// Adds an edge taken only when its condition evaluates true.
    pub fn add_conditional_edge(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        condition: crate::condition::ConditionExpr,
    ) -> &mut Self {
        self.edges.push(Edge::when(source, target, condition));
        self
    }

    /// Validates the collected nodes and edges and builds the graph.
    ///
    /// Checks, in order: duplicate node ids, dangling edges, at least one
    /// start node, acyclicity, reachability from the start set, loop bounds,
    /// and fallback-policy targets.
    pub fn build(self) -> Result<Graph, GraphValidationError> {
        let mut nodes: HashMap<String, Node> = HashMap::with_capacity(self.nodes.len());
        for node in self.nodes {
            if nodes.contains_key(&node.id) {
                return Err(GraphValidationError::DuplicateNodeId(node.id));
            }
            nodes.insert(node.id.clone(), node);
        }

        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !nodes.contains_key(endpoint) {
                    return Err(GraphValidationError::DanglingEdge {
                        from: edge.source.clone(),
                        to: edge.target.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
        }

        let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();
        let mut incoming: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, edge) in self.edges.iter().enumerate() {
            outgoing.entry(edge.source.clone()).or_default().push(i);
            incoming.entry(edge.target.clone()).or_default().push(i);
        }

        // Start set: explicit Start nodes win; otherwise nodes with no
        // incoming edges. Deterministic order for test stability.
        let mut start_ids: Vec<String> = nodes
            .values()
            .filter(|n| n.is_start())
            .map(|n| n.id.clone())
            .collect();
        if start_ids.is_empty() {
            start_ids = nodes
                .keys()
                .filter(|id| !incoming.contains_key(*id))
                .cloned()
                .collect();
        }
        start_ids.sort();
        if start_ids.is_empty() {
            return Err(GraphValidationError::NoStartNode);
        }

        detect_cycle(&nodes, &self.edges, &outgoing)?;
        check_reachability(&nodes, &self.edges, &outgoing, &start_ids)?;

        for node in nodes.values() {
            if let NodeKind::Loop(cfg) = &node.kind {
                if cfg.max_iterations.is_none() && cfg.until.is_none() {
                    return Err(GraphValidationError::LoopWithoutBound(node.id.clone()));
                }
            }
            if let Some(RetryPolicy::Fallback { node: fallback }) = &node.retry {
                if !nodes.contains_key(fallback) {
                    return Err(GraphValidationError::UnknownFallbackNode {
                        node: node.id.clone(),
                        fallback: fallback.clone(),
                    });
                }
            }
        }

        Ok(Graph {
            name: self.name,
            nodes,
            edges: self.edges,
            outgoing,
            incoming,
            start_ids,
        })
    }
}

/// White/gray/black depth-first search; a gray-to-gray edge is a back edge.
fn detect_cycle(
    nodes: &HashMap<String, Node>,
    edges: &[Edge],
    outgoing: &HashMap<String, Vec<usize>>,
) -> Result<(), GraphValidationError> {
    #[derive(PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: HashMap<&str, Color> =
        nodes.keys().map(|id| (id.as_str(), Color::White)).collect();

    // Iterative DFS with an explicit stack; (node, child cursor) frames.
    let mut ids: Vec<&str> = nodes.keys().map(String::as_str).collect();
    ids.sort();
    for root in ids {
        if color[root] != Color::White {
            continue;
        }
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        color.insert(root, Color::Gray);
        while let Some((id, cursor)) = stack.pop() {
            let succs = outgoing.get(id).map(Vec::as_slice).unwrap_or(&[]);
            if cursor < succs.len() {
                stack.push((id, cursor + 1));
                let next = edges[succs[cursor]].target.as_str();
                match color[next] {
                    Color::Gray => {
                        return Err(GraphValidationError::CycleDetected(next.to_string()))
                    }
                    Color::White => {
                        color.insert(next, Color::Gray);
                        stack.push((next, 0));
                    }
                    Color::Black => {}
                }
            } else {
                color.insert(id, Color::Black);
            }
        }
    }
    Ok(())
}

fn check_reachability(
    nodes: &HashMap<String, Node>,
    edges: &[Edge],
    outgoing: &HashMap<String, Vec<usize>>,
    start_ids: &[String],
) -> Result<(), GraphValidationError> {
    let mut reached: HashSet<&str> = HashSet::new();
    let mut queue: Vec<&str> = start_ids.iter().map(String::as_str).collect();
    // Fallback targets are reached through their owner's retry policy, not
    // through an edge.
    for node in nodes.values() {
        if let Some(RetryPolicy::Fallback { node: fallback }) = &node.retry {
            queue.push(fallback.as_str());
        }
    }
    while let Some(id) = queue.pop() {
        if !reached.insert(id) {
            continue;
        }
        for &i in outgoing.get(id).into_iter().flatten() {
            queue.push(edges[i].target.as_str());
        }
    }
    let mut unreached: Vec<&String> = nodes
        .keys()
        .filter(|id| !reached.contains(id.as_str()))
        .collect();
    unreached.sort();
    if let Some(id) = unreached.first() {
        return Err(GraphValidationError::UnreachableNode((*id).clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionExpr;
    use crate::graph::{LoopConfig, NodeKind};
    use std::sync::Arc;

    fn marker(id: &str) -> Node {
        Node::new(id, NodeKind::Start)
    }

    fn plain(id: &str) -> Node {
        Node::new(id, NodeKind::Condition {
            expr: ConditionExpr::always(),
        })
    }

    fn linear(ids: &[&str]) -> GraphBuilder {
        let mut b = GraphBuilder::new("g");
        for (i, id) in ids.iter().enumerate() {
            if i == 0 {
                b.add_node(marker(id));
            } else {
                b.add_node(plain(id));
                b.add_edge(ids[i - 1], *id);
            }
        }
        b
    }

    /// **Scenario**: Valid linear chain builds; start set and adjacency match.
    #[test]
    fn build_linear_chain() {
        let g = linear(&["a", "b", "c"]).build().expect("graph builds");
        assert_eq!(g.start_ids(), ["a".to_string()]);
        assert_eq!(g.outgoing("a").count(), 1);
        assert_eq!(g.incoming("c").count(), 1);
        assert_eq!(g.predecessors("c"), vec!["b"]);
    }

    /// **Scenario**: Registering two nodes with the same id fails with
    /// DuplicateNodeId.
    #[test]
    fn build_rejects_duplicate_id() {
        let mut b = GraphBuilder::new("g");
        b.add_node(marker("a"));
        b.add_node(plain("a"));
        assert!(matches!(
            b.build(),
            Err(GraphValidationError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    /// **Scenario**: Edge to an unregistered node fails with DanglingEdge.
    #[test]
    fn build_rejects_dangling_edge() {
        let mut b = GraphBuilder::new("g");
        b.add_node(marker("a"));
        b.add_edge("a", "ghost");
        assert!(matches!(
            b.build(),
            Err(GraphValidationError::DanglingEdge { missing, .. }) if missing == "ghost"
        ));
    }

    /// **Scenario**: A cyclic graph is rejected at build time with
    /// CycleDetected, before any run is attempted.
    #[test]
    fn build_rejects_cycle() {
        let mut b = GraphBuilder::new("g");
        b.add_node(marker("s"));
        b.add_node(plain("a"));
        b.add_node(plain("b"));
        b.add_edge("s", "a");
        b.add_edge("a", "b");
        b.add_edge("b", "a");
        assert!(matches!(
            b.build(),
            Err(GraphValidationError::CycleDetected(_))
        ));
    }

    /// **Scenario**: A node with no path from any start node fails with
    /// UnreachableNode.
    #[test]
    fn build_rejects_unreachable_node() {
        let mut b = GraphBuilder::new("g");
        b.add_node(marker("s"));
        b.add_node(plain("a"));
        b.add_node(plain("island"));
        b.add_edge("s", "a");
        // "island" has no incoming edges but is not a Start node, and an
        // explicit Start exists, so it is not a start candidate.
        assert!(matches!(
            b.build(),
            Err(GraphValidationError::UnreachableNode(id)) if id == "island"
        ));
    }

    /// **Scenario**: Graph with no nodes at all fails with NoStartNode.
    #[test]
    fn build_rejects_empty_graph() {
        let b = GraphBuilder::new("g");
        assert!(matches!(b.build(), Err(GraphValidationError::NoStartNode)));
    }

    /// **Scenario**: Loop node with neither max_iterations nor until is a
    /// configuration error, not an infinite-loop risk.
    #[test]
    fn build_rejects_unbounded_loop() {
        let body = {
            let mut b = GraphBuilder::new("body");
            b.add_node(marker("inner"));
            b.build().unwrap()
        };
        let mut b = GraphBuilder::new("g");
        b.add_node(Node::new("lp", NodeKind::Loop(LoopConfig::new(Arc::new(body)))));
        assert!(matches!(
            b.build(),
            Err(GraphValidationError::LoopWithoutBound(id)) if id == "lp"
        ));
    }

    /// **Scenario**: Fallback policy naming an unknown node is rejected.
    #[test]
    fn build_rejects_unknown_fallback() {
        let mut b = GraphBuilder::new("g");
        b.add_node(marker("s").with_retry(RetryPolicy::Fallback {
            node: "nope".into(),
        }));
        assert!(matches!(
            b.build(),
            Err(GraphValidationError::UnknownFallbackNode { .. })
        ));
    }

    /// **Scenario**: A fallback target with no inbound edges is reachable
    /// through the retry policy that names it.
    #[test]
    fn fallback_target_counts_as_reachable() {
        let mut b = GraphBuilder::new("g");
        b.add_node(marker("s").with_retry(RetryPolicy::Fallback {
            node: "alt".into(),
        }));
        b.add_node(plain("alt"));
        assert!(b.build().is_ok());
    }

    /// **Scenario**: Without an explicit Start kind, zero-incoming-edge nodes
    /// seed the start set.
    #[test]
    fn implicit_start_from_zero_incoming() {
        let mut b = GraphBuilder::new("g");
        b.add_node(plain("a"));
        b.add_node(plain("b"));
        b.add_edge("a", "b");
        let g = b.build().expect("graph builds");
        assert_eq!(g.start_ids(), ["a".to_string()]);
    }
}
