//! CLI module for cgraph.
//!
//! Commands:
//! - Scan: scan, watch
//! - Validate: check, generate
//! - Query: deps, order
//! - Edit: fix, set-deps, detach

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::graph::{Diagnostic, Edge, GraphStats, ManifestFormat, Node, ScanStats, Snapshot};

/// Exit code for a clean run.
pub const EXIT_OK: i32 = 0;
/// Diagnostics were reported (check, generate, strict failures).
pub const EXIT_DIAGNOSTICS: i32 = 1;
/// The checked-in manifest no longer matches the code.
pub const EXIT_DRIFT: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "cgraph")]
#[command(about = "Task dependency graphs from annotations in source comments")]
#[command(version)]
pub struct Cli {
    /// Project root directory (default: current directory)
    #[arg(short, long, default_value = ".", global = true)]
    pub root: PathBuf,

    /// Treat every diagnostic as an error
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    // ─── Scan ─────────────────────────────────────────────────────
    /// Scan the project and summarize the task graph
    Scan {
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,

        /// Ignore and do not update the snapshot cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Rescan on every change until stdin closes
    Watch,

    // ─── Validate ─────────────────────────────────────────────────
    /// Fail on diagnostics or on drift from .comment-graph
    Check,

    /// Write .comment-graph (or .comment-graph.json) from the current annotations
    Generate {
        /// Exit successfully even when diagnostics were reported
        #[arg(long)]
        allow_errors: bool,

        /// Manifest format
        #[arg(long, value_enum, default_value_t = ManifestFormat::Yaml)]
        format: ManifestFormat,
    },

    // ─── Query ────────────────────────────────────────────────────
    /// Show what a task depends on and what depends on it
    Deps {
        /// Task id (`#` prefix and case are ignored)
        id: String,
    },

    /// Print tasks in dependency order
    Order,

    // ─── Edit ─────────────────────────────────────────────────────
    /// Add placeholder ids to TODO comments that have none
    Fix,

    /// Rewrite the dependency line of a task
    SetDeps {
        /// Task to edit
        id: String,

        /// Declared tasks it depends on
        deps: Vec<String>,

        /// Allow an empty list, removing the dependency line
        #[arg(long)]
        allow_empty: bool,
    },

    /// Remove one dependency of a task, or all of them
    Detach {
        /// Task to edit
        id: String,

        /// Dependency to drop
        #[arg(required_unless_present = "all")]
        dep: Option<String>,

        /// Drop every dependency
        #[arg(long, conflicts_with = "dep")]
        all: bool,
    },
}

/// Everything `scan --json` prints.
#[derive(Debug, Serialize)]
pub struct ScanReport<'a> {
    pub generation: u64,
    pub nodes: Vec<&'a Node>,
    pub edges: Vec<Edge>,
    pub diagnostics: &'a [Diagnostic],
    pub cycles: &'a [Vec<String>],
    pub order: &'a [String],
    pub isolated: Vec<&'a str>,
    pub stats: ScanStats,
    pub graph: GraphStats,
}

impl<'a> ScanReport<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self {
            generation: snapshot.generation(),
            nodes: snapshot.nodes(),
            edges: snapshot.edges(),
            diagnostics: snapshot.diagnostics(),
            cycles: snapshot.cycles(),
            order: snapshot.topological_order(),
            isolated: snapshot.isolated().into_iter().map(|n| n.id.as_str()).collect(),
            stats: snapshot.stats(),
            graph: snapshot.graph_stats(),
        }
    }
}

/// Short plain-text summary of a snapshot.
pub fn format_summary(snapshot: &Snapshot) -> String {
    let graph = snapshot.graph_stats();
    let mut out = String::new();
    let _ = writeln!(out, "{}", snapshot.stats());
    let _ = writeln!(out, "  Tasks:       {}", graph.total_nodes);
    let _ = writeln!(out, "  Edges:       {}", graph.total_edges);
    let _ = writeln!(out, "  Isolated:    {}", graph.isolated_nodes);
    let _ = writeln!(out, "  Diagnostics: {}", snapshot.diagnostics().len());
    out
}

/// One line per diagnostic, in snapshot order.
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| format!("  [{}] {}\n", d.kind(), d))
        .collect()
}

/// Dependencies and dependents of one task.
pub fn format_deps(snapshot: &Snapshot, id: &str) -> Option<String> {
    let deps = snapshot.dependencies_of(id);
    let dependents = snapshot.dependents_of(id);
    let node = snapshot.node(id);
    if node.is_none() && deps.is_empty() && dependents.is_empty() {
        return None;
    }

    let mut out = String::new();
    match node {
        Some(node) => {
            let _ = write!(out, "{} ({})", node.id, node.defined_at);
            if let Some(title) = &node.title {
                let _ = write!(out, " - {title}");
            }
            out.push('\n');
        }
        None => {
            let _ = writeln!(out, "{id} (undeclared)");
        }
    }
    let _ = writeln!(out, "  depends on:   {}", list_or_none(&deps));
    let _ = writeln!(out, "  depended by:  {}", list_or_none(&dependents));
    Some(out)
}

fn list_or_none(ids: &[&str]) -> String {
    if ids.is_empty() {
        "(none)".to_string()
    } else {
        ids.join(", ")
    }
}
