//! Full scans: walk, parse in parallel, assemble, validate.
//!
//! Each file's parse is a pure function of its content and runs on a rayon
//! pool. Everything after that (builder, validator) is single-threaded over
//! the path-sorted records, which is what makes results deterministic.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ScanOptions;
use crate::error::{GraphError, Result};
use crate::graph::{Snapshot, SourceRecord, SourceStatus};
use crate::normalize::attach;
use crate::parser::{parse_source, DialectTable};
use crate::source::{read_source, SourceContent, SourceWalker};

/// Cooperative cancellation flag shared between a scan and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(GraphError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Read and parse one file into its retained record.
pub fn parse_file(path: &Path, dialects: &DialectTable) -> SourceRecord {
    let file = read_source(path);
    let (status, normalized) = match &file.content {
        SourceContent::Text(text) => {
            let statements = parse_source(path, text, dialects);
            (SourceStatus::Parsed, attach(path, &statements))
        }
        SourceContent::Binary => {
            debug!(file = %path.display(), "binary file skipped");
            (SourceStatus::Binary, Default::default())
        }
        SourceContent::Unreadable(reason) => {
            warn!(file = %path.display(), reason = %reason, "unreadable source");
            (SourceStatus::Unreadable(reason.clone()), Default::default())
        }
    };
    SourceRecord {
        signature: file.signature,
        status,
        declarations: normalized.declarations,
        orphan_dependencies: normalized.orphan_dependencies,
        rejected_ids: normalized.rejected_ids,
    }
}

/// Records for entries the walk could not visit.
pub(crate) fn walk_failures(errors: BTreeMap<PathBuf, String>) -> BTreeMap<PathBuf, SourceRecord> {
    errors
        .into_iter()
        .map(|(path, reason)| (path, SourceRecord::unreadable(reason)))
        .collect()
}

/// Runs scans for one set of options.
pub struct Scanner {
    options: ScanOptions,
    dialects: DialectTable,
    cancel: CancelToken,
}

impl Scanner {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            dialects: DialectTable::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Use a custom rule table instead of the built-in one.
    pub fn with_dialects(mut self, dialects: DialectTable) -> Self {
        self.dialects = dialects;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Scan every candidate under the roots and enforce the strict policy.
    pub fn scan(&self) -> Result<Snapshot> {
        let snapshot = self.scan_lenient(1)?;
        self.options.strict.check(snapshot.diagnostics())?;
        Ok(snapshot)
    }

    /// Scan without the strict check. `generation` is stamped on the result.
    pub(crate) fn scan_lenient(&self, generation: u64) -> Result<Snapshot> {
        let walker = SourceWalker::new(&self.options)?;
        let walked = walker.candidates();
        self.cancel.check()?;

        let paths: Vec<PathBuf> = walked.files.into_iter().collect();
        let mut sources = walk_failures(walked.errors);
        sources.extend(self.parse_all(&paths)?);
        self.finish(sources, generation)
    }

    /// Parse `paths` in parallel, honoring cancellation and the pool size.
    pub(crate) fn parse_all(&self, paths: &[PathBuf]) -> Result<Vec<(PathBuf, SourceRecord)>> {
        let run = || {
            paths
                .par_iter()
                .map(|path| {
                    self.cancel.check()?;
                    Ok((path.clone(), parse_file(path, &self.dialects)))
                })
                .collect::<Result<Vec<_>>>()
        };

        match self.options.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
                pool.install(run)
            }
            None => run(),
        }
    }

    /// Assemble and validate, unless cancelled in the meantime.
    pub(crate) fn finish(
        &self,
        sources: BTreeMap<PathBuf, SourceRecord>,
        generation: u64,
    ) -> Result<Snapshot> {
        self.cancel.check()?;
        let snapshot = Snapshot::from_sources(self.options.clone(), sources, generation);
        self.cancel.check()?;

        let stats = snapshot.graph_stats();
        info!(
            files = snapshot.stats().files_scanned,
            nodes = stats.total_nodes,
            edges = stats.total_edges,
            diagnostics = snapshot.diagnostics().len(),
            generation,
            "scan complete"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DiagnosticKind;
    use std::fs;

    #[test]
    fn test_parse_file_records_declarations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.go");
        let content = "// TODO:[#a] first\n// DEPS: #b\n";
        fs::write(&path, content).unwrap();

        let record = parse_file(&path, DialectTable::builtin());
        assert_eq!(record.status, SourceStatus::Parsed);
        assert_eq!(record.declarations.len(), 1);
        assert_eq!(record.declarations[0].dependencies[0].id, "b");
        assert_eq!(record.signature.len, content.len() as u64);
    }

    #[test]
    fn test_parse_file_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.rs");
        fs::write(&path, b"// @cgraph-id a\n\0\0").unwrap();
        let record = parse_file(&path, DialectTable::builtin());
        assert_eq!(record.status, SourceStatus::Binary);
        assert!(record.declarations.is_empty());
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "// @cgraph-id a\n").unwrap();
        let token = CancelToken::new();
        token.cancel();
        let scanner = Scanner::new(ScanOptions::new([dir.path()])).with_cancel(token);
        assert!(matches!(scanner.scan(), Err(GraphError::Cancelled)));
    }

    #[test]
    fn test_cancelled_after_parse_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "// @cgraph-id a\n").unwrap();
        let options = ScanOptions::new([dir.path()]);
        let store = crate::graph::SnapshotStore::new(Snapshot::empty(options.clone()));

        let token = CancelToken::new();
        let scanner = Scanner::new(options).with_cancel(token.clone());
        let paths = SourceWalker::new(scanner.options()).unwrap().candidates().files;
        let paths: Vec<PathBuf> = paths.into_iter().collect();
        let parsed = scanner.parse_all(&paths).unwrap();
        assert_eq!(parsed.len(), 1);

        token.cancel();
        match scanner.finish(parsed.into_iter().collect(), 1) {
            Err(GraphError::Cancelled) => {}
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(store.load().generation(), 0);
        assert!(store.load().nodes().is_empty());
    }

    #[test]
    fn test_walk_failures_become_unreadable_sources() {
        let mut errors = BTreeMap::new();
        errors.insert(PathBuf::from("/repo/private"), "permission denied".to_string());
        let mut sources = walk_failures(errors);
        sources.insert(
            PathBuf::from("/repo/a.rs"),
            SourceRecord::unreadable("invalid UTF-8"),
        );

        let snap = Snapshot::from_sources(ScanOptions::new(["/repo"]), sources, 1);
        let unreadable: Vec<_> = snap.diagnostics_of(DiagnosticKind::UnreadableSource).collect();
        assert_eq!(unreadable.len(), 2);
        assert!(matches!(
            unreadable[1],
            crate::graph::Diagnostic::UnreadableSource { file, reason }
                if file == Path::new("/repo/private") && reason == "permission denied"
        ));
        assert_eq!(snap.stats().unreadable, 2);
    }

    #[test]
    fn test_custom_dialect_table() {
        use crate::graph::Dialect;
        use crate::parser::{Extractor, RuleSpec, StatementKind};

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "// TASK(a) first\n").unwrap();

        let mut table = DialectTable::builtin().clone();
        table
            .push(RuleSpec {
                dialect: Dialect::MarkerBracket,
                kind: StatementKind::Id,
                pattern: r"^TASK\((?P<id>[^)]*)\)\s*(?P<rest>.*)$",
                extractor: Extractor::SingleId,
                starts_block: true,
            })
            .unwrap();

        let snap = Scanner::new(ScanOptions::new([dir.path()]))
            .with_dialects(table)
            .scan()
            .unwrap();
        assert_eq!(snap.node("a").and_then(|n| n.title.clone()).as_deref(), Some("first"));
    }

    #[test]
    fn test_fixed_pool_size() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..8 {
            fs::write(dir.path().join(format!("f{i}.rs")), format!("// @cgraph-id t{i}\n")).unwrap();
        }
        let snap = Scanner::new(ScanOptions::new([dir.path()]).with_threads(2))
            .scan()
            .unwrap();
        assert_eq!(snap.nodes().len(), 8);
        assert_eq!(snap.diagnostics_of(DiagnosticKind::DuplicateNodeId).count(), 0);
    }
}
