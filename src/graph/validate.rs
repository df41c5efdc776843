//! Validator: cycle detection and topological ordering.
//!
//! Cycles come from Tarjan's SCC over resolved edges; dangling edges never
//! enter the petgraph arena so they are not traversed. The order covers
//! every node outside a cycle, dependencies first, ties broken by id.

use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::debug;

use super::engine::TaskGraph;
use super::types::{Diagnostic, Location};

/// Output of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    /// Members of each cycle, ascending; cycles sorted by first member.
    pub cycles: Vec<Vec<String>>,
    pub order: Vec<String>,
    /// One `CycleDetected` per entry of `cycles`, same order.
    pub diagnostics: Vec<Diagnostic>,
}

/// Run the full validator over a graph.
pub fn validate(graph: &TaskGraph) -> Validation {
    let inner = graph.inner_graph();

    let mut cycles: Vec<Vec<NodeIndex>> = tarjan_scc(inner)
        .into_iter()
        .filter(|scc| scc.len() > 1 || inner.find_edge(scc[0], scc[0]).is_some())
        .collect();
    for scc in &mut cycles {
        scc.sort_by(|&a, &b| inner[a].id.cmp(&inner[b].id));
    }
    cycles.sort_by(|a, b| inner[a[0]].id.cmp(&inner[b[0]].id));

    let in_cycle: HashSet<NodeIndex> = cycles.iter().flatten().copied().collect();
    let order = topological_order(graph, &in_cycle);

    let diagnostics = cycles
        .iter()
        .map(|scc| Diagnostic::CycleDetected {
            members: scc.iter().map(|&idx| inner[idx].id.clone()).collect(),
            locations: scc
                .iter()
                .map(|&idx| inner[idx].defined_at.clone())
                .collect::<Vec<Location>>(),
        })
        .collect();

    let cycles: Vec<Vec<String>> = cycles
        .iter()
        .map(|scc| scc.iter().map(|&idx| inner[idx].id.clone()).collect())
        .collect();

    debug!(cycles = cycles.len(), ordered = order.len(), "validation complete");

    Validation {
        cycles,
        order,
        diagnostics,
    }
}

/// Kahn's algorithm with a min-heap on id.
///
/// A node is ready once all of its dependencies are emitted. Cycle members
/// are left out, and so is every edge touching one.
fn topological_order(graph: &TaskGraph, in_cycle: &HashSet<NodeIndex>) -> Vec<String> {
    let inner = graph.inner_graph();

    let mut pending: HashMap<NodeIndex, usize> = HashMap::new();
    let mut ready = BinaryHeap::new();

    for idx in inner.node_indices().filter(|idx| !in_cycle.contains(idx)) {
        let deps = inner
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| !in_cycle.contains(&e.target()))
            .count();
        if deps == 0 {
            ready.push(Reverse((inner[idx].id.as_str(), idx)));
        } else {
            pending.insert(idx, deps);
        }
    }

    let mut order = Vec::with_capacity(inner.node_count() - in_cycle.len());
    while let Some(Reverse((id, idx))) = ready.pop() {
        order.push(id.to_string());
        for edge in inner.edges_directed(idx, Direction::Incoming) {
            let dependent = edge.source();
            if let Some(count) = pending.get_mut(&dependent) {
                *count -= 1;
                if *count == 0 {
                    pending.remove(&dependent);
                    ready.push(Reverse((inner[dependent].id.as_str(), dependent)));
                }
            }
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Dialect, DiagnosticKind, Node};

    fn graph(ids: &[&str], edges: &[(&str, &str)]) -> TaskGraph {
        let mut graph = TaskGraph::new();
        for (i, id) in ids.iter().enumerate() {
            graph.add_node(Node {
                id: id.to_string(),
                title: None,
                defined_at: Location::new(format!("{id}.rs"), i + 1),
                dialect: Dialect::Keyword,
            });
        }
        for (from, to) in edges {
            graph.add_edge(from, to, Location::new(format!("{from}.rs"), 99));
        }
        graph
    }

    #[test]
    fn test_two_node_cycle() {
        let result = validate(&graph(&["b", "a"], &[("a", "b"), ("b", "a")]));
        assert_eq!(result.cycles, vec![vec!["a".to_string(), "b".to_string()]]);
        assert!(result.order.is_empty());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].kind(), DiagnosticKind::CycleDetected);
        assert_eq!(result.diagnostics[0].ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_self_loop_is_cycle() {
        let result = validate(&graph(&["a", "b"], &[("a", "a")]));
        assert_eq!(result.cycles, vec![vec!["a".to_string()]]);
        assert_eq!(result.order, vec!["b".to_string()]);
    }

    #[test]
    fn test_order_dependencies_first_ties_by_id() {
        // c depends on a and b; d depends on c.
        let result = validate(&graph(
            &["d", "c", "b", "a"],
            &[("c", "a"), ("c", "b"), ("d", "c")],
        ));
        assert!(result.cycles.is_empty());
        assert_eq!(result.order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_order_ignores_edges_into_cycles() {
        let result = validate(&graph(
            &["x", "y", "z", "w"],
            &[("x", "y"), ("y", "x"), ("z", "x"), ("w", "z")],
        ));
        assert_eq!(result.cycles.len(), 1);
        assert_eq!(result.order, vec!["z", "w"]);
    }

    #[test]
    fn test_cycles_sorted_by_first_member() {
        let result = validate(&graph(
            &["q", "p", "b", "a"],
            &[("q", "p"), ("p", "q"), ("b", "a"), ("a", "b")],
        ));
        let firsts: Vec<&str> = result.cycles.iter().map(|c| c[0].as_str()).collect();
        assert_eq!(firsts, vec!["a", "p"]);
    }

    #[test]
    fn test_dangling_edges_not_traversed() {
        let result = validate(&graph(&["a"], &[("a", "ghost")]));
        assert!(result.cycles.is_empty());
        assert_eq!(result.order, vec!["a"]);
    }
}
