//! On-disk forms of a snapshot.
//!
//! The bincode cache keeps everything a later `refresh` needs. The manifest
//! (`.comment-graph` as YAML, or `.comment-graph.json`) is the reviewable,
//! checked-in form: nodes and edges only, with paths relative to the project
//! root.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use super::snapshot::Snapshot;
use crate::error::{GraphError, Result};

/// Bumped whenever the cached snapshot layout changes.
const CACHE_FORMAT_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = ".comment-graph";
pub const MANIFEST_JSON_FILE: &str = ".comment-graph.json";
const MANIFEST_VERSION: u32 = 1;

// ─── Snapshot Cache ─────────────────────────────────────────────

impl Snapshot {
    /// Write the snapshot to `path` with bincode, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            bincode::serialize_into(&mut writer, &CACHE_FORMAT_VERSION)?;
            bincode::serialize_into(&mut writer, self)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        debug!(cache = %path.display(), nodes = self.nodes().len(), "snapshot saved");
        Ok(())
    }

    /// Read a snapshot written by [`Snapshot::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        let version: u32 = bincode::deserialize_from(&mut reader)?;
        if version != CACHE_FORMAT_VERSION {
            return Err(GraphError::SnapshotVersion(path.to_path_buf()));
        }
        let snapshot: Snapshot = bincode::deserialize_from(&mut reader)?;
        info!(
            cache = %path.display(),
            nodes = snapshot.nodes().len(),
            generation = snapshot.generation(),
            "snapshot loaded"
        );
        Ok(snapshot)
    }
}

// ─── Manifest ───────────────────────────────────────────────────

/// Encoding of a manifest file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ManifestFormat {
    #[default]
    Yaml,
    Json,
}

impl ManifestFormat {
    pub const ALL: [ManifestFormat; 2] = [ManifestFormat::Yaml, ManifestFormat::Json];

    /// Conventional file name at the project root.
    pub fn file_name(self) -> &'static str {
        match self {
            ManifestFormat::Yaml => MANIFEST_FILE,
            ManifestFormat::Json => MANIFEST_JSON_FILE,
        }
    }

    /// `.json` files are JSON, anything else is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ManifestFormat::Json,
            _ => ManifestFormat::Yaml,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestNode {
    /// Path relative to the project root, `/`-separated.
    pub file: String,
    pub line: usize,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestEdge {
    pub from: String,
    pub to: String,
}

/// Serializable graph summary written to `.comment-graph`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    #[serde(default)]
    pub nodes: BTreeMap<String, ManifestNode>,
    #[serde(default)]
    pub edges: Vec<ManifestEdge>,
}

impl Manifest {
    /// Summarize a snapshot, relativizing paths against `root`.
    pub fn from_snapshot(snapshot: &Snapshot, root: &Path) -> Self {
        let nodes = snapshot
            .nodes()
            .into_iter()
            .map(|node| {
                let file = node.defined_at.file.strip_prefix(root).unwrap_or(&node.defined_at.file);
                (
                    node.id.clone(),
                    ManifestNode {
                        file: file.to_string_lossy().replace('\\', "/"),
                        line: node.defined_at.line,
                        title: node.title.clone(),
                    },
                )
            })
            .collect();

        let edges = snapshot
            .edges()
            .into_iter()
            .map(|edge| ManifestEdge {
                from: edge.from,
                to: edge.to,
            })
            .collect();

        Self {
            version: MANIFEST_VERSION,
            nodes,
            edges,
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn render(&self, format: ManifestFormat) -> Result<String> {
        match format {
            ManifestFormat::Yaml => self.to_yaml(),
            ManifestFormat::Json => self.to_json(),
        }
    }

    /// Write to `path` in the format its extension implies, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render(ManifestFormat::from_path(path))?)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        match ManifestFormat::from_path(path) {
            ManifestFormat::Yaml => Self::from_yaml(&text),
            ManifestFormat::Json => Self::from_json(&text),
        }
    }

    /// Same nodes (id, file, line) and the same edge set, ignoring order and titles.
    pub fn matches(&self, other: &Manifest) -> bool {
        let same_nodes = self.nodes.len() == other.nodes.len()
            && self.nodes.iter().all(|(id, node)| {
                other
                    .nodes
                    .get(id)
                    .is_some_and(|o| o.file == node.file && o.line == node.line)
            });
        let edges = |m: &Manifest| m.edges.iter().cloned().collect::<BTreeSet<_>>();
        same_nodes && edges(self) == edges(other)
    }
}
