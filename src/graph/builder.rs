//! Graph builder: declarations in, task graph plus builder diagnostics out.
//!
//! Declarations are consumed in (file, line) order. The first declaration of
//! an id becomes the node; later ones only report `DuplicateNodeId`, but
//! their dependency references still become edges from that id.

use tracing::debug;

use super::engine::{EdgeInsert, TaskGraph};
use super::types::{Diagnostic, Node};
use crate::normalize::Declaration;

/// Build a task graph from declarations.
///
/// Returns duplicate diagnostics in declaration order, followed by dangling
/// diagnostics sorted by `(from, to)`.
pub fn assemble<'a, I>(declarations: I) -> (TaskGraph, Vec<Diagnostic>)
where
    I: IntoIterator<Item = &'a Declaration>,
{
    let mut ordered: Vec<&Declaration> = declarations.into_iter().collect();
    ordered.sort_by(|a, b| a.defined_at.cmp(&b.defined_at));

    let mut graph = TaskGraph::new();
    let mut diagnostics = Vec::new();

    for decl in &ordered {
        let node = Node {
            id: decl.id.clone(),
            title: decl.title.clone(),
            defined_at: decl.defined_at.clone(),
            dialect: decl.dialect,
        };
        if graph.add_node(node).is_none() {
            let first = graph
                .node(&decl.id)
                .map(|n| n.defined_at.clone())
                .unwrap_or_else(|| decl.defined_at.clone());
            debug!(id = %decl.id, first = %first, duplicate = %decl.defined_at, "duplicate task id");
            diagnostics.push(Diagnostic::DuplicateNodeId {
                id: decl.id.clone(),
                first,
                duplicate: decl.defined_at.clone(),
            });
        }
    }

    let mut dangling = 0;
    for decl in &ordered {
        for dep in &decl.dependencies {
            if graph.add_edge(&decl.id, &dep.id, dep.declared_at.clone()) == EdgeInsert::Dangling {
                dangling += 1;
            }
        }
    }

    diagnostics.extend(graph.dangling_edges().filter_map(|(from, to, declared_at)| {
        let defined_at = graph.node(from)?.defined_at.clone();
        Some(Diagnostic::DanglingDependency {
            from: from.to_string(),
            to: to.to_string(),
            defined_at,
            declared_at: declared_at.clone(),
        })
    }));

    debug!(
        nodes = graph.len(),
        declarations = ordered.len(),
        dangling,
        "graph assembled"
    );

    (graph, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Dialect, DiagnosticKind, Location};
    use crate::normalize::DependencyRef;

    fn decl(id: &str, file: &str, line: usize, deps: &[&str]) -> Declaration {
        Declaration {
            id: id.to_string(),
            title: None,
            defined_at: Location::new(file, line),
            dialect: Dialect::MarkerBracket,
            dependencies: deps
                .iter()
                .map(|d| DependencyRef {
                    id: d.to_string(),
                    declared_at: Location::new(file, line + 1),
                })
                .collect(),
        }
    }

    #[test]
    fn test_assemble_simple_chain() {
        let decls = vec![decl("a", "a.rs", 1, &["b"]), decl("b", "b.rs", 1, &[])];
        let (graph, diagnostics) = assemble(&decls);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.dependencies_of("a"), vec!["b"]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_duplicate_earliest_wins_regardless_of_input_order() {
        let decls = vec![decl("x", "z.rs", 3, &[]), decl("x", "a.rs", 7, &[])];
        let (graph, diagnostics) = assemble(&decls);
        assert_eq!(graph.node("x").map(|n| n.defined_at.clone()), Some(Location::new("a.rs", 7)));
        assert_eq!(
            diagnostics,
            vec![Diagnostic::DuplicateNodeId {
                id: "x".to_string(),
                first: Location::new("a.rs", 7),
                duplicate: Location::new("z.rs", 3),
            }]
        );
    }

    #[test]
    fn test_duplicate_declaration_edges_are_kept() {
        let decls = vec![
            decl("x", "a.rs", 1, &["y"]),
            decl("x", "b.rs", 1, &["z"]),
            decl("y", "c.rs", 1, &[]),
            decl("z", "c.rs", 5, &[]),
        ];
        let (graph, _) = assemble(&decls);
        assert_eq!(graph.dependencies_of("x"), vec!["y", "z"]);
    }

    #[test]
    fn test_dangling_reference() {
        let decls = vec![decl("a", "a.rs", 4, &["b"])];
        let (graph, diagnostics) = assemble(&decls);
        assert!(graph.node("b").is_none());
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind(), DiagnosticKind::DanglingDependency);
        assert_eq!(diagnostics[0].locations()[0], Location::new("a.rs", 4));
        assert_eq!(diagnostics[0].locations()[1], Location::new("a.rs", 5));
    }

    #[test]
    fn test_duplicates_reported_before_dangling() {
        let decls = vec![
            decl("a", "a.rs", 1, &["ghost"]),
            decl("a", "b.rs", 1, &[]),
        ];
        let (_, diagnostics) = assemble(&decls);
        let kinds: Vec<DiagnosticKind> = diagnostics.iter().map(Diagnostic::kind).collect();
        assert_eq!(
            kinds,
            vec![DiagnosticKind::DuplicateNodeId, DiagnosticKind::DanglingDependency]
        );
    }
}
