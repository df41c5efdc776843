//! The core graph engine.
//!
//! Uses petgraph to store task dependencies and provides deterministic,
//! read-only queries over them. Edges whose target was never declared are
//! kept on the side as dangling references; they are part of the edge set
//! but never get a node of their own.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::types::{Edge, Location, Node};

/// The task graph: one node per canonical id, one edge per `(from, to)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "GraphParts", from = "GraphParts")]
pub struct TaskGraph {
    /// Resolved nodes and edges. Edge weight is the dependency statement location.
    graph: DiGraph<Node, Location>,
    /// Index: canonical id -> node index.
    index: HashMap<String, NodeIndex>,
    /// Edges whose `to` has no node, keyed by `(from, to)`.
    dangling: BTreeMap<(String, String), Location>,
}

/// Result of inserting an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeInsert {
    Added,
    /// `(from, to)` was already present; the first `declared_at` is kept.
    Existing,
    /// Added, but the target has no node.
    Dangling,
}

impl TaskGraph {
    /// Create a new empty task graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            dangling: BTreeMap::new(),
        }
    }

    /// Access the underlying petgraph (for validation).
    pub(crate) fn inner_graph(&self) -> &DiGraph<Node, Location> {
        &self.graph
    }

    // ─── Node Operations ────────────────────────────────────────

    /// Add a node. The first node for an id is authoritative: returns `None`
    /// and leaves the graph untouched if the id is already present.
    pub fn add_node(&mut self, node: Node) -> Option<NodeIndex> {
        if self.index.contains_key(&node.id) {
            return None;
        }
        let id = node.id.clone();
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        Some(idx)
    }

    // ─── Edge Operations ────────────────────────────────────────

    /// Add the edge `from -> to`. `from` must already be a node; the
    /// builder only ever adds edges from declared ids.
    pub fn add_edge(&mut self, from: &str, to: &str, declared_at: Location) -> EdgeInsert {
        let Some(&src) = self.index.get(from) else {
            return EdgeInsert::Existing;
        };
        match self.index.get(to) {
            Some(&dst) => {
                if self.graph.find_edge(src, dst).is_some() {
                    return EdgeInsert::Existing;
                }
                self.graph.add_edge(src, dst, declared_at);
                EdgeInsert::Added
            }
            None => {
                let key = (from.to_string(), to.to_string());
                if self.dangling.contains_key(&key) {
                    return EdgeInsert::Existing;
                }
                self.dangling.insert(key, declared_at);
                EdgeInsert::Dangling
            }
        }
    }

    // ─── Query Operations ───────────────────────────────────────

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Look up a node by canonical id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&idx| &self.graph[idx])
    }

    /// All nodes, sorted by id.
    pub fn nodes(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.graph.node_weights().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// All edges including dangling ones, sorted by `(from, to)`.
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self
            .graph
            .edge_references()
            .map(|e| Edge {
                from: self.graph[e.source()].id.clone(),
                to: self.graph[e.target()].id.clone(),
                declared_at: e.weight().clone(),
            })
            .chain(self.dangling.iter().map(|((from, to), at)| Edge {
                from: from.clone(),
                to: to.clone(),
                declared_at: at.clone(),
            }))
            .collect();
        edges.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));
        edges
    }

    /// Edges whose target has no node, sorted by `(from, to)`.
    pub fn dangling_edges(&self) -> impl Iterator<Item = (&str, &str, &Location)> {
        self.dangling
            .iter()
            .map(|((from, to), at)| (from.as_str(), to.as_str(), at))
    }

    /// What `id` depends on, including undeclared targets. Sorted.
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        let mut deps: Vec<&str> = match self.index.get(id) {
            Some(&idx) => self
                .graph
                .edges_directed(idx, Direction::Outgoing)
                .map(|e| self.graph[e.target()].id.as_str())
                .collect(),
            None => Vec::new(),
        };
        deps.extend(
            self.dangling
                .keys()
                .filter(|(from, _)| from == id)
                .map(|(_, to)| to.as_str()),
        );
        deps.sort_unstable();
        deps
    }

    /// What depends on `id`. Works for undeclared ids too. Sorted.
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        let mut deps: Vec<&str> = match self.index.get(id) {
            Some(&idx) => self
                .graph
                .edges_directed(idx, Direction::Incoming)
                .map(|e| self.graph[e.source()].id.as_str())
                .collect(),
            None => self
                .dangling
                .keys()
                .filter(|(_, to)| to == id)
                .map(|(from, _)| from.as_str())
                .collect(),
        };
        deps.sort_unstable();
        deps
    }

    /// Nodes with no incident edge (dangling edges count). Sorted.
    pub fn isolated(&self) -> Vec<&Node> {
        let mut isolated: Vec<&Node> = self
            .graph
            .node_indices()
            .filter(|&idx| {
                self.graph.neighbors_undirected(idx).next().is_none()
                    && !self.has_dangling_from(&self.graph[idx].id)
            })
            .map(|idx| &self.graph[idx])
            .collect();
        isolated.sort_by(|a, b| a.id.cmp(&b.id));
        isolated
    }

    // ─── Stats ──────────────────────────────────────────────────

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            total_nodes: self.graph.node_count(),
            total_edges: self.graph.edge_count() + self.dangling.len(),
            dangling_edges: self.dangling.len(),
            isolated_nodes: self.isolated().len(),
        }
    }

    // ─── Internal Helpers ───────────────────────────────────────

    fn has_dangling_from(&self, id: &str) -> bool {
        self.dangling
            .range((id.to_string(), String::new())..)
            .next()
            .is_some_and(|((from, _), _)| from == id)
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TaskGraph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes() == other.nodes() && self.edges() == other.edges()
    }
}

impl Eq for TaskGraph {}

// ─── Serialization ──────────────────────────────────────────────

/// Flat, order-stable form of a [`TaskGraph`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphParts {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl From<TaskGraph> for GraphParts {
    fn from(graph: TaskGraph) -> Self {
        GraphParts {
            nodes: graph.nodes().into_iter().cloned().collect(),
            edges: graph.edges(),
        }
    }
}

impl From<GraphParts> for TaskGraph {
    fn from(parts: GraphParts) -> Self {
        let mut graph = TaskGraph::new();
        for node in parts.nodes {
            graph.add_node(node);
        }
        for edge in parts.edges {
            graph.add_edge(&edge.from, &edge.to, edge.declared_at);
        }
        graph
    }
}

// ─── Query Result Types ─────────────────────────────────────────

/// Statistics about the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    /// Resolved plus dangling edges.
    pub total_edges: usize,
    pub dangling_edges: usize,
    pub isolated_nodes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Dialect;

    fn node(id: &str, line: usize) -> Node {
        Node {
            id: id.to_string(),
            title: None,
            defined_at: Location::new("a.rs", line),
            dialect: Dialect::AtTag,
        }
    }

    fn at(line: usize) -> Location {
        Location::new("a.rs", line)
    }

    #[test]
    fn test_empty_graph() {
        let graph = TaskGraph::new();
        let stats = graph.stats();
        assert_eq!(stats.total_nodes, 0);
        assert_eq!(stats.total_edges, 0);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_first_node_wins() {
        let mut graph = TaskGraph::new();
        assert!(graph.add_node(node("a", 1)).is_some());
        assert!(graph.add_node(node("a", 9)).is_none());
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.node("a").map(|n| n.defined_at.line), Some(1));
    }

    #[test]
    fn test_edges_are_a_set() {
        let mut graph = TaskGraph::new();
        graph.add_node(node("a", 1));
        graph.add_node(node("b", 5));
        assert_eq!(graph.add_edge("a", "b", at(2)), EdgeInsert::Added);
        assert_eq!(graph.add_edge("a", "b", at(3)), EdgeInsert::Existing);
        let edges = graph.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].declared_at, at(2));
    }

    #[test]
    fn test_dangling_edge_is_kept_without_node() {
        let mut graph = TaskGraph::new();
        graph.add_node(node("a", 1));
        assert_eq!(graph.add_edge("a", "ghost", at(2)), EdgeInsert::Dangling);
        assert!(!graph.contains("ghost"));
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.dependencies_of("a"), vec!["ghost"]);
        assert_eq!(graph.dependents_of("ghost"), vec!["a"]);
        assert!(graph.isolated().is_empty());
        assert_eq!(graph.stats().dangling_edges, 1);
    }

    #[test]
    fn test_dependencies_and_dependents_sorted() {
        let mut graph = TaskGraph::new();
        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            graph.add_node(node(id, i + 1));
        }
        graph.add_edge("a", "d", at(10));
        graph.add_edge("a", "b", at(11));
        graph.add_edge("c", "b", at(12));
        assert_eq!(graph.dependencies_of("a"), vec!["b", "d"]);
        assert_eq!(graph.dependents_of("b"), vec!["a", "c"]);
        assert!(graph.dependencies_of("missing").is_empty());
    }

    #[test]
    fn test_isolated_nodes() {
        let mut graph = TaskGraph::new();
        graph.add_node(node("z", 1));
        graph.add_node(node("a", 2));
        graph.add_node(node("b", 3));
        graph.add_edge("a", "b", at(4));
        let ids: Vec<&str> = graph.isolated().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["z"]);
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let mut first = TaskGraph::new();
        first.add_node(node("a", 1));
        first.add_node(node("b", 2));
        first.add_edge("a", "b", at(3));

        let mut second = TaskGraph::new();
        second.add_node(node("b", 2));
        second.add_node(node("a", 1));
        second.add_edge("a", "b", at(3));

        assert_eq!(first, second);
    }

    #[test]
    fn test_serde_round_trip_keeps_dangling() {
        let mut graph = TaskGraph::new();
        graph.add_node(node("a", 1));
        graph.add_edge("a", "b", at(2));
        let json = serde_json::to_string(&graph).unwrap();
        let back: TaskGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(graph, back);
        assert_eq!(back.dangling_edges().count(), 1);
    }
}
