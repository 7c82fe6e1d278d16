//! Change detection
//!
//! Watches a pair's folder recursively and turns bursts of filesystem events into
//! single "dirty" signals. Debouncing happens here, at the producer: raw events
//! restart a quiet window, and only when the window elapses is one signal posted
//! to a channel of capacity one. A signal already waiting absorbs new ones.

use notify::event::{EventKind, ModifyKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::error::{SyncError, SyncResult};
use crate::shared::IgnoreMatcher;

/// Raw notifications buffered between the watcher thread and the debouncer
const RAW_CAPACITY: usize = 256;

/// Signal delivered to the owning scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Something under the folder changed and activity has quiesced
    Dirty,
    /// The watch died; no further events follow
    Failed(SyncError),
}

#[derive(Debug)]
enum RawEvent {
    Changed,
    Error(String),
}

/// A live (or injected) stream of dirty signals for one folder
pub struct ChangeDetector {
    signals: mpsc::Receiver<WatchEvent>,
    watcher: Option<RecommendedWatcher>,
    debouncer: Option<JoinHandle<()>>,
}

impl ChangeDetector {
    /// Arm a recursive watch on `root`. Must be called inside a tokio runtime.
    pub fn start(root: &Path, ignore: Arc<IgnoreMatcher>, window: Duration) -> SyncResult<Self> {
        let (raw_tx, raw_rx) = mpsc::channel(RAW_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel(1);

        let watch_root = root.to_path_buf();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let raw = match res {
                Ok(event) => match classify(&watch_root, &ignore, &event) {
                    Some(raw) => {
                        tracing::trace!(paths = ?relative_paths(&watch_root, &event), kind = ?event.kind, "Change observed");
                        raw
                    }
                    None => return,
                },
                Err(e) => RawEvent::Error(e.to_string()),
            };
            // A full buffer already guarantees a pending signal
            let _ = raw_tx.try_send(raw);
        })
        .map_err(|e| SyncError::Watch(e.to_string()))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| SyncError::Watch(format!("{}: {e}", root.display())))?;

        let debouncer = tokio::spawn(debounce(raw_rx, out_tx, window));
        tracing::debug!(path = %root.display(), "Watching for changes");

        Ok(Self {
            signals: out_rx,
            watcher: Some(watcher),
            debouncer: Some(debouncer),
        })
    }

    /// Wrap an externally driven signal channel
    pub fn from_signals(signals: mpsc::Receiver<WatchEvent>) -> Self {
        Self {
            signals,
            watcher: None,
            debouncer: None,
        }
    }

    /// Next signal; `None` once the watch has shut down
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.signals.recv().await
    }

    /// Release the watch. A fresh one can be armed with [`ChangeDetector::start`].
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.watcher.take();
        if let Some(task) = self.debouncer.take() {
            task.abort();
        }
    }
}

impl Drop for ChangeDetector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decide what a notify event means for the pair, if anything
fn classify(root: &Path, ignore: &IgnoreMatcher, event: &Event) -> Option<RawEvent> {
    if matches!(event.kind, EventKind::Remove(_)) && event.paths.iter().any(|p| p == root) {
        return Some(RawEvent::Error(format!(
            "watched folder {} was removed",
            root.display()
        )));
    }

    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Other)
            | EventKind::Any
    );
    if !relevant_kind {
        return None;
    }

    event
        .paths
        .iter()
        .any(|p| !ignore.is_ignored_under(root, p))
        .then_some(RawEvent::Changed)
}

/// Collapse raw events into dirty signals emitted after `window` of quiet
async fn debounce(
    mut raw: mpsc::Receiver<RawEvent>,
    out: mpsc::Sender<WatchEvent>,
    window: Duration,
) {
    while let Some(event) = raw.recv().await {
        if let RawEvent::Error(msg) = event {
            let _ = out.send(WatchEvent::Failed(SyncError::Watch(msg))).await;
            return;
        }

        loop {
            match tokio::time::timeout(window, raw.recv()).await {
                Ok(Some(RawEvent::Changed)) => continue,
                Ok(Some(RawEvent::Error(msg))) => {
                    let _ = out.send(WatchEvent::Failed(SyncError::Watch(msg))).await;
                    return;
                }
                Ok(None) => return,
                Err(_) => break,
            }
        }

        match out.try_send(WatchEvent::Dirty) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => return,
        }
    }
}

/// Paths of an event relative to `root`, for diagnostics
pub fn relative_paths(root: &Path, event: &Event) -> Vec<PathBuf> {
    event
        .paths
        .iter()
        .filter_map(|p| p.strip_prefix(root).ok().map(Path::to_path_buf))
        .collect()
}
