//! Immutable scan results and the store that publishes them.
//!
//! A [`Snapshot`] owns the graph, diagnostics, validator output and the
//! per-file records an incremental rescan starts from. Once built it is
//! never mutated; [`SnapshotStore`] swaps whole snapshots behind an `Arc`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::builder::assemble;
use super::engine::{GraphStats, TaskGraph};
use super::types::{Diagnostic, DiagnosticKind, Edge, Node, ScanStats};
use super::validate::validate;
use crate::config::ScanOptions;
use crate::normalize::{canonical_id, Declaration};
use crate::source::ChangeSignature;

/// How a file fared when it was last read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceStatus {
    Parsed,
    Binary,
    Unreadable(String),
}

/// Everything retained about one candidate file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub signature: ChangeSignature,
    pub status: SourceStatus,
    pub declarations: Vec<Declaration>,
    pub orphan_dependencies: usize,
    pub rejected_ids: usize,
}

impl SourceRecord {
    /// A path that could not be read at all.
    pub fn unreadable(reason: impl Into<String>) -> Self {
        Self {
            signature: ChangeSignature::default(),
            status: SourceStatus::Unreadable(reason.into()),
            declarations: Vec::new(),
            orphan_dependencies: 0,
            rejected_ids: 0,
        }
    }
}

/// A complete, validated view of the annotations under the scan roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    graph: TaskGraph,
    diagnostics: Vec<Diagnostic>,
    cycles: Vec<Vec<String>>,
    order: Vec<String>,
    sources: BTreeMap<PathBuf, SourceRecord>,
    options: ScanOptions,
    stats: ScanStats,
    generation: u64,
    created_at: DateTime<Utc>,
}

impl Snapshot {
    /// Run the builder and validator over per-file records.
    ///
    /// Diagnostics come out as: unreadable sources by path, duplicates in
    /// declaration order, dangling references by `(from, to)`, then cycles.
    pub fn from_sources(
        options: ScanOptions,
        sources: BTreeMap<PathBuf, SourceRecord>,
        generation: u64,
    ) -> Self {
        let mut diagnostics: Vec<Diagnostic> = sources
            .iter()
            .filter_map(|(path, record)| match &record.status {
                SourceStatus::Unreadable(reason) => Some(Diagnostic::UnreadableSource {
                    file: path.clone(),
                    reason: reason.clone(),
                }),
                _ => None,
            })
            .collect();

        let (graph, built) = assemble(sources.values().flat_map(|r| r.declarations.iter()));
        diagnostics.extend(built);

        let validation = validate(&graph);
        diagnostics.extend(validation.diagnostics);

        let stats = sources.values().fold(ScanStats::default(), |mut stats, record| {
            stats.files_scanned += 1;
            match record.status {
                SourceStatus::Parsed => {}
                SourceStatus::Binary => stats.binary_skipped += 1,
                SourceStatus::Unreadable(_) => stats.unreadable += 1,
            }
            stats.declarations += record.declarations.len();
            stats.orphan_dependencies += record.orphan_dependencies;
            stats.rejected_ids += record.rejected_ids;
            stats
        });

        Self {
            graph,
            diagnostics,
            cycles: validation.cycles,
            order: validation.order,
            sources,
            options,
            stats,
            generation,
            created_at: Utc::now(),
        }
    }

    /// An empty snapshot for `options`, generation 0.
    pub fn empty(options: ScanOptions) -> Self {
        Self::from_sources(options, BTreeMap::new(), 0)
    }

    // ─── Queries ────────────────────────────────────────────────

    /// All nodes, sorted by id.
    pub fn nodes(&self) -> Vec<&Node> {
        self.graph.nodes()
    }

    /// Look up a node; `id` is normalized first, so `#Foo` finds `foo`.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.graph.node(&canonical_id(id)?)
    }

    /// All edges including dangling ones, sorted by `(from, to)`.
    pub fn edges(&self) -> Vec<Edge> {
        self.graph.edges()
    }

    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        match canonical_id(id) {
            Some(id) => self.graph.dependencies_of(&id),
            None => Vec::new(),
        }
    }

    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        match canonical_id(id) {
            Some(id) => self.graph.dependents_of(&id),
            None => Vec::new(),
        }
    }

    /// Cycle member lists, each sorted, ordered by first member.
    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    /// Nodes outside any cycle, dependencies first.
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind() == kind)
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Nodes with no incident edge, sorted by id.
    pub fn isolated(&self) -> Vec<&Node> {
        self.graph.isolated()
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn graph_stats(&self) -> GraphStats {
        self.graph.stats()
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    // ─── Metadata ───────────────────────────────────────────────

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn sources(&self) -> &BTreeMap<PathBuf, SourceRecord> {
        &self.sources
    }

    pub fn source(&self, path: &Path) -> Option<&SourceRecord> {
        self.sources.get(path)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Equality over results only: generation, timestamp and options are ignored.
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.graph == other.graph
            && self.diagnostics == other.diagnostics
            && self.cycles == other.cycles
            && self.order == other.order
            && self.stats == other.stats
    }
}

impl Eq for Snapshot {}

// ─── Store ──────────────────────────────────────────────────────

/// Holds the current snapshot for concurrent readers.
///
/// Readers clone the `Arc` and read without holding the lock.
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The currently published snapshot.
    pub fn load(&self) -> Arc<Snapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the current snapshot, returning the previous one.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let next = Arc::new(snapshot);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Dialect, Location};
    use crate::normalize::DependencyRef;

    fn record(decls: Vec<Declaration>) -> SourceRecord {
        SourceRecord {
            signature: ChangeSignature::default(),
            status: SourceStatus::Parsed,
            declarations: decls,
            orphan_dependencies: 0,
            rejected_ids: 0,
        }
    }

    fn decl(id: &str, file: &str, deps: &[&str]) -> Declaration {
        Declaration {
            id: id.to_string(),
            title: None,
            defined_at: Location::new(file, 1),
            dialect: Dialect::AtTag,
            dependencies: deps
                .iter()
                .map(|d| DependencyRef {
                    id: d.to_string(),
                    declared_at: Location::new(file, 2),
                })
                .collect(),
        }
    }

    fn snapshot(entries: Vec<(&str, SourceRecord)>) -> Snapshot {
        let sources = entries
            .into_iter()
            .map(|(path, record)| (PathBuf::from(path), record))
            .collect();
        Snapshot::from_sources(ScanOptions::default(), sources, 1)
    }

    #[test]
    fn test_diagnostic_order() {
        let unreadable = SourceRecord {
            status: SourceStatus::Unreadable("denied".into()),
            ..record(vec![])
        };
        let snap = snapshot(vec![
            ("a.rs", record(vec![decl("a", "a.rs", &["b", "ghost"])])),
            ("b.rs", record(vec![decl("b", "b.rs", &["a"])])),
            ("c.rs", record(vec![decl("a", "c.rs", &[])])),
            ("z.rs", unreadable),
        ]);
        let kinds: Vec<DiagnosticKind> = snap.diagnostics().iter().map(Diagnostic::kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiagnosticKind::UnreadableSource,
                DiagnosticKind::DuplicateNodeId,
                DiagnosticKind::DanglingDependency,
                DiagnosticKind::CycleDetected,
            ]
        );
        assert_eq!(snap.stats().unreadable, 1);
        assert_eq!(snap.stats().files_scanned, 4);
        assert_eq!(snap.stats().declarations, 3);
    }

    #[test]
    fn test_queries_normalize_ids() {
        let snap = snapshot(vec![("a.rs", record(vec![decl("a", "a.rs", &["b"]), decl("b", "a.rs", &[])]))]);
        assert!(snap.node("#A").is_some());
        assert_eq!(snap.dependencies_of("A:"), vec!["b"]);
        assert_eq!(snap.dependents_of("[#b]"), vec!["a"]);
        assert!(snap.dependencies_of("###").is_empty());
        assert_eq!(snap.topological_order(), &["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_equality_ignores_generation() {
        let first = snapshot(vec![("a.rs", record(vec![decl("a", "a.rs", &[])]))]);
        let mut second = first.clone();
        second.generation = 7;
        assert_eq!(first, second);
    }

    #[test]
    fn test_store_publish_swaps() {
        let store = SnapshotStore::new(Snapshot::empty(ScanOptions::default()));
        let reader = store.load();
        assert_eq!(reader.generation(), 0);

        let next = snapshot(vec![("a.rs", record(vec![decl("a", "a.rs", &[])]))]);
        let previous = store.publish(next);
        assert_eq!(previous.generation(), 0);
        assert_eq!(store.load().generation(), 1);
        // Readers holding the old Arc still see the old graph.
        assert!(reader.nodes().is_empty());
        assert_eq!(store.load().nodes().len(), 1);
    }
}
