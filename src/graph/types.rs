//! Core types for the task graph.
//!
//! Defines annotation dialects, source locations, nodes, edges and the
//! diagnostics attached to a scan.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The annotation syntax that produced a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `@cgraph-id foo` / `@cgraph-deps a, b` (also `@todo-*`).
    AtTag,
    /// `TODO[#foo] title`, `FIXME:[#foo]`.
    MarkerBracket,
    /// `TODO #foo title`.
    MarkerHash,
    /// `id: foo`, `depends-on: #a #b`, `deps: a`.
    Keyword,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::AtTag => write!(f, "at_tag"),
            Dialect::MarkerBracket => write!(f, "marker_bracket"),
            Dialect::MarkerHash => write!(f, "marker_hash"),
            Dialect::Keyword => write!(f, "keyword"),
        }
    }
}

/// A position in a scanned file. Orders by path, then line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: PathBuf,
    /// 1-indexed line number.
    pub line: usize,
}

impl Location {
    pub fn new(file: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// One task, keyed by its canonical id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// Free text found next to the declaring annotation.
    pub title: Option<String>,
    /// Anchor of the first accepted declaration.
    pub defined_at: Location,
    pub dialect: Dialect,
}

/// `from` cannot be considered complete until `to` is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    /// Line of the dependency statement that introduced the edge.
    pub declared_at: Location,
}

/// Diagnostic classes, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UnreadableSource,
    DuplicateNodeId,
    DanglingDependency,
    CycleDetected,
}

impl DiagnosticKind {
    pub const ALL: [DiagnosticKind; 4] = [
        DiagnosticKind::UnreadableSource,
        DiagnosticKind::DuplicateNodeId,
        DiagnosticKind::DanglingDependency,
        DiagnosticKind::CycleDetected,
    ];
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::UnreadableSource => write!(f, "unreadable_source"),
            DiagnosticKind::DuplicateNodeId => write!(f, "duplicate_node_id"),
            DiagnosticKind::DanglingDependency => write!(f, "dangling_dependency"),
            DiagnosticKind::CycleDetected => write!(f, "cycle_detected"),
        }
    }
}

/// A non-fatal problem found while scanning or validating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// The file could not be read and was left out of the graph.
    UnreadableSource { file: PathBuf, reason: String },
    /// `id` was declared again; the node at `first` stays authoritative.
    DuplicateNodeId {
        id: String,
        first: Location,
        duplicate: Location,
    },
    /// `from` depends on `to`, but nothing declares `to`.
    DanglingDependency {
        from: String,
        to: String,
        /// Where the dependent node is defined.
        defined_at: Location,
        /// Where the dependency statement appears.
        declared_at: Location,
    },
    /// The members form one strongly connected component.
    CycleDetected {
        members: Vec<String>,
        locations: Vec<Location>,
    },
}

impl Diagnostic {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Diagnostic::UnreadableSource { .. } => DiagnosticKind::UnreadableSource,
            Diagnostic::DuplicateNodeId { .. } => DiagnosticKind::DuplicateNodeId,
            Diagnostic::DanglingDependency { .. } => DiagnosticKind::DanglingDependency,
            Diagnostic::CycleDetected { .. } => DiagnosticKind::CycleDetected,
        }
    }

    /// Canonical ids involved in this diagnostic.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Diagnostic::UnreadableSource { .. } => Vec::new(),
            Diagnostic::DuplicateNodeId { id, .. } => vec![id.as_str()],
            Diagnostic::DanglingDependency { from, to, .. } => vec![from.as_str(), to.as_str()],
            Diagnostic::CycleDetected { members, .. } => {
                members.iter().map(String::as_str).collect()
            }
        }
    }

    /// Locations the diagnostic points at.
    pub fn locations(&self) -> Vec<Location> {
        match self {
            Diagnostic::UnreadableSource { file, .. } => vec![Location::new(file.clone(), 0)],
            Diagnostic::DuplicateNodeId {
                first, duplicate, ..
            } => vec![first.clone(), duplicate.clone()],
            Diagnostic::DanglingDependency {
                defined_at,
                declared_at,
                ..
            } => vec![defined_at.clone(), declared_at.clone()],
            Diagnostic::CycleDetected { locations, .. } => locations.clone(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnreadableSource { file, reason } => {
                write!(f, "{}: unreadable source ({})", file.display(), reason)
            }
            Diagnostic::DuplicateNodeId {
                id,
                first,
                duplicate,
            } => write!(
                f,
                "{}: duplicate id '{}' (first defined at {})",
                duplicate, id, first
            ),
            Diagnostic::DanglingDependency {
                from,
                to,
                declared_at,
                ..
            } => write!(
                f,
                "{}: '{}' depends on undeclared '{}'",
                declared_at, from, to
            ),
            Diagnostic::CycleDetected { members, .. } => {
                write!(f, "cycle detected: {}", members.join(" -> "))
            }
        }
    }
}

/// Counters collected while walking and parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub files_scanned: usize,
    pub binary_skipped: usize,
    pub unreadable: usize,
    pub declarations: usize,
    /// Dependency statements in a block without a valid id.
    pub orphan_dependencies: usize,
    /// Id tokens that normalized to nothing.
    pub rejected_ids: usize,
}

impl fmt::Display for ScanStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scanned {} files ({} declarations, {} binary skipped, {} unreadable)",
            self.files_scanned, self.declarations, self.binary_skipped, self.unreadable
        )
    }
}
