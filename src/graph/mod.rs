//! Task graph module: nodes, edges, validation and snapshots.
//!
//! Provides the data model, the petgraph-backed engine, the builder and
//! validator passes, and immutable snapshots with their on-disk forms.

pub mod builder;
pub mod engine;
pub mod persistence;
pub mod snapshot;
pub mod types;
pub mod validate;

pub use builder::assemble;
pub use engine::{EdgeInsert, GraphStats, TaskGraph};
pub use persistence::{
    Manifest, ManifestEdge, ManifestFormat, ManifestNode, MANIFEST_FILE, MANIFEST_JSON_FILE,
};
pub use snapshot::{Snapshot, SnapshotStore, SourceRecord, SourceStatus};
pub use types::{Diagnostic, DiagnosticKind, Dialect, Edge, Location, Node, ScanStats};
pub use validate::{validate, Validation};
