//! Incremental updater: derive a new snapshot from a prior one plus a delta.
//!
//! The candidate list is always re-walked (metadata only), so additions,
//! removals and ignore-rule changes are picked up. Only changed files and
//! files the prior snapshot never saw are re-read; every other per-file
//! record is reused as-is. The builder and the full validator then run over
//! the merged records, so the result equals a fresh full scan. Walk errors
//! are never carried over; each pass records what its own walk could not visit.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::debug;

use crate::error::Result;
use crate::graph::Snapshot;
use crate::scan::{walk_failures, Scanner};
use crate::source::{normalize_path, Candidates, SourceWalker};

impl Scanner {
    /// Rescan after `changed` paths were modified, added or removed.
    pub fn rescan(&self, prior: &Snapshot, changed: &[PathBuf]) -> Result<Snapshot> {
        let walker = SourceWalker::new(self.options())?;
        let walked = walker.candidates();
        let changed: BTreeSet<PathBuf> = changed.iter().map(|p| normalize_path(p)).collect();

        let snapshot = self.merge(prior, walked, &changed)?;
        self.options().strict.check(snapshot.diagnostics())?;
        Ok(snapshot)
    }

    /// Rescan whatever changed on disk since `prior`, judged by change signatures.
    pub fn refresh(&self, prior: &Snapshot) -> Result<Snapshot> {
        let walker = SourceWalker::new(self.options())?;
        let walked = walker.candidates();
        let signatures = walked.signatures();

        let changed: BTreeSet<PathBuf> = signatures
            .iter()
            .filter(|(path, signature)| {
                prior
                    .source(path)
                    .is_some_and(|record| record.signature != **signature)
            })
            .map(|(path, _)| path.clone())
            .collect();
        debug!(changed = changed.len(), "change signatures compared");

        let snapshot = self.merge(prior, walked, &changed)?;
        self.options().strict.check(snapshot.diagnostics())?;
        Ok(snapshot)
    }

    fn merge(
        &self,
        prior: &Snapshot,
        walked: Candidates,
        changed: &BTreeSet<PathBuf>,
    ) -> Result<Snapshot> {
        let mut sources = walk_failures(walked.errors);
        let mut to_parse = Vec::new();

        for path in walked.files {
            match prior.source(&path) {
                Some(record) if !changed.contains(&path) => {
                    sources.insert(path, record.clone());
                }
                _ => to_parse.push(path),
            }
        }

        let dropped = prior
            .sources()
            .keys()
            .filter(|path| !sources.contains_key(*path) && !to_parse.contains(*path))
            .count();
        debug!(
            reused = sources.len(),
            reparsed = to_parse.len(),
            dropped,
            "incremental rescan"
        );

        sources.extend(self.parse_all(&to_parse)?);
        self.finish(sources, prior.generation() + 1)
    }
}
