//! Scan options, strict policy, and the on-disk `config.toml`.
//!
//! `GraphConfig` lives at `<root>/.cgraph/config.toml`. Every section is
//! optional; a missing file means defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{GraphError, Result};
use crate::graph::{Diagnostic, DiagnosticKind};

/// Directory holding config and cache, relative to the project root.
pub const CONFIG_DIR: &str = ".cgraph";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_CACHE_FILE: &str = "snapshot.bin";
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Directory names never descended into.
pub const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "vendor", ".idea", ".vscode"];

// ─── Scan Options ───────────────────────────────────────────────

/// What to scan and how strictly to treat the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub roots: Vec<PathBuf>,
    /// Glob patterns (gitignore syntax) excluded from the walk.
    pub ignore: Vec<String>,
    /// Extension allowlist without the dot. Empty means every text file.
    pub extensions: Vec<String>,
    pub skip_hidden: bool,
    pub respect_gitignore: bool,
    /// Parser pool size; `None` uses the global rayon pool.
    pub threads: Option<usize>,
    pub strict: StrictPolicy,
}

impl ScanOptions {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_ignore(mut self, pattern: impl Into<String>) -> Self {
        self.ignore.push(pattern.into());
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn with_strict(mut self, strict: StrictPolicy) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Whether `path` passes the extension allowlist.
    pub fn accepts_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            ignore: Vec::new(),
            extensions: Vec::new(),
            skip_hidden: true,
            respect_gitignore: true,
            threads: None,
            strict: StrictPolicy::default(),
        }
    }
}

// ─── Strict Policy ──────────────────────────────────────────────

/// Diagnostic kinds that fail a scan at the API boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrictPolicy {
    kinds: BTreeSet<DiagnosticKind>,
}

impl StrictPolicy {
    /// Nothing is fatal.
    pub fn none() -> Self {
        Self::default()
    }

    /// Every diagnostic is fatal.
    pub fn all() -> Self {
        Self {
            kinds: DiagnosticKind::ALL.into_iter().collect(),
        }
    }

    pub fn with(mut self, kind: DiagnosticKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    pub fn contains(&self, kind: DiagnosticKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Fail with the first strict kind (in reporting order) that has diagnostics.
    pub fn check(&self, diagnostics: &[Diagnostic]) -> Result<()> {
        for kind in &self.kinds {
            let matching: Vec<Diagnostic> = diagnostics
                .iter()
                .filter(|d| d.kind() == *kind)
                .cloned()
                .collect();
            if !matching.is_empty() {
                return Err(GraphError::Strict {
                    kind: *kind,
                    count: matching.len(),
                    diagnostics: matching,
                });
            }
        }
        Ok(())
    }
}

impl FromIterator<DiagnosticKind> for StrictPolicy {
    fn from_iter<I: IntoIterator<Item = DiagnosticKind>>(iter: I) -> Self {
        Self {
            kinds: iter.into_iter().collect(),
        }
    }
}

// ─── Config File ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub scan: ScanSection,
    pub strict: StrictSection,
    pub watch: WatchSection,
    pub cache: CacheSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSection {
    pub ignore: Vec<String>,
    pub extensions: Vec<String>,
    pub skip_hidden: bool,
    pub respect_gitignore: bool,
    pub threads: Option<usize>,
}

impl Default for ScanSection {
    fn default() -> Self {
        let options = ScanOptions::default();
        Self {
            ignore: options.ignore,
            extensions: options.extensions,
            skip_hidden: options.skip_hidden,
            respect_gitignore: options.respect_gitignore,
            threads: options.threads,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrictSection {
    /// Treat every diagnostic kind as fatal.
    pub all: bool,
    pub kinds: Vec<DiagnosticKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    pub debounce_ms: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Snapshot file; relative paths resolve against the config directory.
    pub path: Option<PathBuf>,
    pub disabled: bool,
}

impl GraphConfig {
    /// Load config from `path`, falling back to defaults on any problem.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!(config = %path.display(), "no config file, using defaults");
            return Self::default();
        }
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(config = %path.display(), error = %e, "invalid config, using defaults");
                Self::default()
            }
        }
    }

    /// Load `<root>/.cgraph/config.toml`.
    pub fn discover(root: &Path) -> Self {
        Self::load(&root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load config from `path`, reporting read and parse failures.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn strict_policy(&self) -> StrictPolicy {
        if self.strict.all {
            StrictPolicy::all()
        } else {
            self.strict.kinds.iter().copied().collect()
        }
    }

    /// Build scan options for `roots` from the `[scan]` and `[strict]` sections.
    pub fn scan_options<I, P>(&self, roots: I) -> ScanOptions
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut options = ScanOptions::new(roots)
            .with_extensions(self.scan.extensions.iter().cloned())
            .with_strict(self.strict_policy());
        options.ignore = self.scan.ignore.clone();
        options.skip_hidden = self.scan.skip_hidden;
        options.respect_gitignore = self.scan.respect_gitignore;
        options.threads = self.scan.threads;
        options
    }

    /// Snapshot cache location for a config directory.
    pub fn resolve_cache_path(&self, config_dir: &Path) -> PathBuf {
        match &self.cache.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => config_dir.join(path),
            None => config_dir.join(DEFAULT_CACHE_FILE),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watch.debounce_ms)
    }
}
