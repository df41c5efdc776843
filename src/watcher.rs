//! Watch mode. Keeps a [`SnapshotStore`] in sync with the filesystem.
//!
//! Debounced notifications from `notify-debouncer-mini` are batched into one
//! `rescan` per burst; the result is published to the store. Watch mode
//! always publishes best-effort snapshots, so strict policies are not applied
//! here. The worker blocks on the event channel and exits once the debouncer
//! is dropped and the channel disconnects.

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{ScanOptions, StrictPolicy, CONFIG_DIR, DEFAULT_DEBOUNCE_MS, SKIPPED_DIRS};
use crate::error::{GraphError, Result};
use crate::graph::{Snapshot, SnapshotStore, MANIFEST_FILE, MANIFEST_JSON_FILE};
use crate::scan::{CancelToken, Scanner};
use crate::source::SourceWalker;

/// Running watcher. Dropping it stops the watcher too.
pub struct WatchHandle {
    debouncer: Option<Debouncer<RecommendedWatcher>>,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Cancel any in-flight rescan, stop watching and join the worker.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.cancel.cancel();
        self.debouncer.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("watch worker panicked");
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Watch the roots of `options` and publish a rescan for every burst of changes.
///
/// `debounce_ms` of 0 uses the default.
pub fn start_watching(
    store: Arc<SnapshotStore>,
    options: ScanOptions,
    debounce_ms: u64,
) -> Result<WatchHandle> {
    start_watching_with(store, options, debounce_ms, |_| {})
}

/// Like [`start_watching`], calling `on_publish` with each new snapshot.
pub fn start_watching_with<F>(
    store: Arc<SnapshotStore>,
    mut options: ScanOptions,
    debounce_ms: u64,
    mut on_publish: F,
) -> Result<WatchHandle>
where
    F: FnMut(Arc<Snapshot>) + Send + 'static,
{
    options.strict = StrictPolicy::none();
    let roots: Vec<PathBuf> = SourceWalker::new(&options)?.roots().map(Path::to_path_buf).collect();

    let debounce = match debounce_ms {
        0 => Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        ms => Duration::from_millis(ms),
    };

    let (tx, rx) = mpsc::channel::<DebounceEventResult>();
    let mut debouncer = new_debouncer(debounce, tx)?;
    for root in &roots {
        debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
        info!(root = %root.display(), "watching for changes");
    }

    let cancel = CancelToken::new();
    let scanner = Scanner::new(options).with_cancel(cancel.clone());

    let worker = std::thread::spawn(move || {
        while let Ok(result) = rx.recv() {
            let events = match result {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = %e, "watch error");
                    continue;
                }
            };

            let changed: BTreeSet<PathBuf> = events
                .into_iter()
                .map(|event| event.path)
                .filter(|path| !in_skipped_dir(path))
                .collect();
            if changed.is_empty() {
                continue;
            }
            debug!(files = changed.len(), "change batch received");

            let prior = store.load();
            let changed: Vec<PathBuf> = changed.into_iter().collect();
            match scanner.rescan(&prior, &changed) {
                Ok(next) => {
                    info!(
                        generation = next.generation(),
                        nodes = next.nodes().len(),
                        diagnostics = next.diagnostics().len(),
                        "snapshot updated"
                    );
                    store.publish(next);
                    on_publish(store.load());
                }
                Err(GraphError::Cancelled) => break,
                Err(e) => warn!(error = %e, "rescan failed, keeping previous snapshot"),
            }
        }
        debug!("watch worker stopped");
    });

    Ok(WatchHandle {
        debouncer: Some(debouncer),
        cancel,
        worker: Some(worker),
    })
}

/// Paths the walker never yields, including the tool's own output.
fn in_skipped_dir(path: &Path) -> bool {
    let own_output = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name == MANIFEST_FILE || name == MANIFEST_JSON_FILE);
    own_output
        || path.components().any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|name| name == CONFIG_DIR || SKIPPED_DIRS.contains(&name))
        })
}
