//! Error types for the comment graph engine.
//!
//! Problems found *in the scanned code* (duplicate ids, dangling references,
//! cycles, unreadable files) are diagnostics and live on the snapshot.
//! `GraphError` is reserved for failures of the engine itself.

use std::path::PathBuf;

use thiserror::Error;

use crate::graph::{Diagnostic, DiagnosticKind, Location};

/// Errors returned by scan, rescan, persistence and watch operations.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no scan roots configured")]
    NoRoots,

    #[error("invalid ignore pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: ignore::Error,
    },

    #[error("invalid annotation rule '{pattern}': {source}")]
    Rule {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("scan cancelled")]
    Cancelled,

    #[error("failed to start parser pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A strict policy rejected the snapshot. The best-effort diagnostics are
    /// carried along so callers can still report them.
    #[error("{count} {kind} diagnostic(s) rejected by strict policy")]
    Strict {
        kind: DiagnosticKind,
        count: usize,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("failed to encode or decode snapshot: {0}")]
    Snapshot(#[from] bincode::Error),

    #[error("snapshot at {0} was written by an incompatible version")]
    SnapshotVersion(PathBuf),

    #[error("invalid graph manifest: {0}")]
    Manifest(#[from] serde_yaml::Error),

    #[error("invalid JSON graph manifest: {0}")]
    ManifestJson(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("no task '{0}'")]
    UnknownTask(String),

    #[error("'{dependency}' is not a dependency of '{id}'")]
    NotADependency { id: String, dependency: String },

    #[error("at least one dependency is required for '{0}'")]
    NoDependencies(String),

    #[error("task '{id}' at {location} has {count} dependency lines; merge them by hand")]
    AmbiguousDependencies {
        id: String,
        location: Location,
        count: usize,
    },

    #[error("task '{id}' is no longer declared at {location}; rescan first")]
    StaleLocation { id: String, location: Location },

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, GraphError>;
