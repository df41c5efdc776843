//! Source walker: enumerates candidate files under the scan roots.
//!
//! Walks each root with `ignore`, honoring hidden-file skipping, `.gitignore`,
//! user ignore globs and the extension allowlist. Candidates come back sorted
//! and deduplicated so every downstream stage sees the same order. Entries
//! the walk cannot visit are returned by path rather than dropped.

use ignore::overrides::{Override, OverrideBuilder};
use ignore::{DirEntry, WalkBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, trace, warn};

use crate::config::{ScanOptions, CONFIG_DIR, SKIPPED_DIRS};
use crate::error::{GraphError, Result};
use crate::graph::{MANIFEST_FILE, MANIFEST_JSON_FILE};

/// Cheap change detector for a file: modification time plus byte length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSignature {
    pub modified: Option<SystemTime>,
    pub len: u64,
}

impl ChangeSignature {
    pub fn of(metadata: &fs::Metadata) -> Self {
        Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        }
    }

    /// Read the signature of `path` from disk.
    pub fn read(path: &Path) -> std::io::Result<Self> {
        fs::metadata(path).map(|m| Self::of(&m))
    }
}

/// What reading a candidate produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceContent {
    Text(String),
    /// Contains a NUL byte; skipped without a diagnostic.
    Binary,
    /// Could not be read or is not UTF-8.
    Unreadable(String),
}

/// One candidate file with its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub signature: ChangeSignature,
    pub content: SourceContent,
}

/// Read a file, classifying it as text, binary, or unreadable.
pub fn read_source(path: &Path) -> SourceFile {
    let signature = ChangeSignature::read(path).unwrap_or_default();
    let content = match fs::read(path) {
        Err(e) => SourceContent::Unreadable(e.to_string()),
        Ok(bytes) if bytes.contains(&0) => SourceContent::Binary,
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(text) => SourceContent::Text(text),
            Err(e) => SourceContent::Unreadable(format!("invalid UTF-8: {}", e.utf8_error())),
        },
    };
    SourceFile {
        path: path.to_path_buf(),
        signature,
        content,
    }
}

/// Walker over the configured roots.
pub struct SourceWalker {
    roots: Vec<(PathBuf, Override)>,
    options: ScanOptions,
}

impl SourceWalker {
    /// Validate roots and ignore globs.
    ///
    /// Roots are canonicalized so that paths recorded in a snapshot compare
    /// equal across scans.
    pub fn new(options: &ScanOptions) -> Result<Self> {
        if options.roots.is_empty() {
            return Err(GraphError::NoRoots);
        }

        let mut roots = Vec::with_capacity(options.roots.len());
        for root in &options.roots {
            let root = fs::canonicalize(root)?;
            let overrides = build_overrides(&root, &options.ignore)?;
            roots.push((root, overrides));
        }

        Ok(Self {
            roots,
            options: options.clone(),
        })
    }

    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(|(root, _)| root.as_path())
    }

    /// Candidate file paths, sorted and deduplicated, plus the entries the
    /// walk could not visit. Metadata only.
    pub fn candidates(&self) -> Candidates {
        let mut found = Candidates::default();

        for (root, overrides) in &self.roots {
            let walker = WalkBuilder::new(root)
                .hidden(self.options.skip_hidden)
                .git_ignore(self.options.respect_gitignore)
                .git_global(self.options.respect_gitignore)
                .git_exclude(self.options.respect_gitignore)
                .require_git(false)
                .overrides(overrides.clone())
                .filter_entry(|entry| !is_skipped(entry))
                .build();
            found.collect(walker, &self.options);
        }

        debug!(
            files = found.files.len(),
            errors = found.errors.len(),
            "candidate files collected"
        );
        found
    }

    /// Lazily read every candidate. Each call restarts the walk.
    pub fn walk(&self) -> impl Iterator<Item = SourceFile> {
        self.candidates().files.into_iter().map(|path| read_source(&path))
    }
}

/// One walk over the roots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates {
    /// Files to parse, sorted and deduplicated.
    pub files: BTreeSet<PathBuf>,
    /// Directories or files the walk could not visit, with the reason.
    pub errors: BTreeMap<PathBuf, String>,
}

impl Candidates {
    fn collect<I>(&mut self, entries: I, options: &ScanOptions)
    where
        I: IntoIterator<Item = std::result::Result<DirEntry, ignore::Error>>,
    {
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    self.record_error(&err);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            if !options.accepts_extension(entry.path()) {
                trace!(file = %entry.path().display(), "extension not allowed");
                continue;
            }
            self.files.insert(entry.into_path());
        }
    }

    fn record_error(&mut self, err: &ignore::Error) {
        match walk_failure(err) {
            Some((path, reason)) => {
                warn!(path = %path.display(), reason = %reason, "walk error, entry skipped");
                self.errors.insert(path, reason);
            }
            None => warn!(error = %err, "walk error"),
        }
    }

    /// Change signatures of every file, without reading content.
    pub fn signatures(&self) -> BTreeMap<PathBuf, ChangeSignature> {
        self.files
            .iter()
            .map(|path| {
                let signature = ChangeSignature::read(path).unwrap_or_default();
                (path.clone(), signature)
            })
            .collect()
    }
}

/// The path an I/O or loop error kept the walk from visiting.
///
/// Soft errors from malformed ignore files skip nothing and have no path here.
fn walk_failure(err: &ignore::Error) -> Option<(PathBuf, String)> {
    match err {
        ignore::Error::WithPath { path, err } if err.is_io() => {
            Some((path.clone(), err.to_string()))
        }
        ignore::Error::WithPath { err, .. }
        | ignore::Error::WithDepth { err, .. }
        | ignore::Error::WithLineNumber { err, .. } => walk_failure(err),
        ignore::Error::Loop { child, .. } => Some((child.clone(), err.to_string())),
        _ => None,
    }
}

/// Directories that never hold sources, and the files this tool writes itself.
fn is_skipped(entry: &DirEntry) -> bool {
    let Some(name) = entry.file_name().to_str() else {
        return false;
    };
    if entry.file_type().is_some_and(|ft| ft.is_dir()) {
        name == CONFIG_DIR || SKIPPED_DIRS.contains(&name)
    } else {
        name == MANIFEST_FILE || name == MANIFEST_JSON_FILE
    }
}

fn build_overrides(root: &Path, patterns: &[String]) -> Result<Override> {
    let mut builder = OverrideBuilder::new(root);
    for pattern in patterns {
        builder
            .add(&format!("!{pattern}"))
            .map_err(|source| GraphError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
    }
    builder.build().map_err(|source| GraphError::Pattern {
        pattern: patterns.join(", "),
        source,
    })
}

/// Make a user-supplied path comparable with walker output.
///
/// Existing paths are canonicalized. Deleted files are resolved through
/// their parent directory, which usually still exists.
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            fs::canonicalize(parent)
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}
