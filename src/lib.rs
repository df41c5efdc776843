//! # cgraph
//!
//! Task dependency graphs from annotations in source comments.
//!
//! cgraph reads lightweight task annotations out of code comments, in any of
//! several phrasings, and assembles them into a validated dependency graph:
//! which pending work blocks which, where ids collide, which references
//! point nowhere, and which tasks wait on each other in a cycle.
//!
//! ## Key Features
//!
//! - **Multi-dialect**: `@cgraph-id` / `@cgraph-deps`, `TODO[#id]`, `TODO #id`,
//!   `id:` / `depends-on:`; mix them freely
//! - **Deterministic**: identical input gives identical nodes, edges and diagnostic order
//! - **Incremental**: `rescan` and `refresh` reparse only what changed
//! - **Live**: watch mode keeps a published snapshot in sync with the filesystem
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cgraph::{scan, ScanOptions};
//!
//! let snapshot = scan(&ScanOptions::new(["."])).unwrap();
//! for id in snapshot.topological_order() {
//!     println!("{id} <- {:?}", snapshot.dependents_of(id));
//! }
//! for diagnostic in snapshot.diagnostics() {
//!     eprintln!("{diagnostic}");
//! }
//! ```

pub mod cli;
pub mod config;
pub mod edit;
pub mod error;
pub mod graph;
pub mod incremental;
pub mod normalize;
pub mod parser;
pub mod scan;
pub mod source;
pub mod watcher;

use std::path::PathBuf;

// Re-exports for convenience
pub use config::{GraphConfig, ScanOptions, StrictPolicy};
pub use error::{GraphError, Result};

// Graph re-exports
pub use graph::{
    Diagnostic, DiagnosticKind, Dialect, Edge, GraphStats, Location, Manifest, ManifestFormat,
    Node, ScanStats, Snapshot, SnapshotStore, TaskGraph, MANIFEST_FILE, MANIFEST_JSON_FILE,
};
pub use edit::{detach_deps, fix_missing_ids, update_deps, update_deps_allow_empty, FixReport};
pub use normalize::canonical_id;
pub use parser::{DialectTable, RuleSpec};
pub use scan::{CancelToken, Scanner};

/// Scan every candidate file under `options.roots`.
pub fn scan(options: &ScanOptions) -> Result<Snapshot> {
    Scanner::new(options.clone()).scan()
}

/// Derive a new snapshot from `prior` after `changed` files were modified,
/// added or removed. Uses the options the prior snapshot was taken with.
pub fn rescan(prior: &Snapshot, changed: &[PathBuf]) -> Result<Snapshot> {
    Scanner::new(prior.options().clone()).rescan(prior, changed)
}

/// Like [`rescan`], detecting the changed files from their change signatures.
pub fn refresh(prior: &Snapshot) -> Result<Snapshot> {
    Scanner::new(prior.options().clone()).refresh(prior)
}
