//! Pipeline orchestration: wires the watcher, debouncer, pattern matcher,
//! content tracker, and store into one task, and republishes every
//! recorded change onto the SSE hub for real-time delivery.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::debounce::{DebouncedChange, DebouncedKind, Debouncer};
use crate::diagnostics::{PipelineDiagnostic, PipelineStage};
use crate::pattern::PatternMatcher;
use crate::sse::SseHub;
use crate::store::Store;
use crate::tracker::{ChangeKind, ContentTracker, TrackedChange};
use crate::watcher::{FileSystemWatcher, RawChange};

/// Payload shape for the `file_updated` SSE topic: `content` is only
/// populated for creations/modifications, never for a deletion.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeNotification {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(rename = "filePath")]
    pub file_path: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl From<&TrackedChange> for ChangeNotification {
    fn from(change: &TrackedChange) -> Self {
        let kind = match change.kind {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        };
        ChangeNotification {
            kind,
            file_path: change.version.path.clone(),
            timestamp: Utc::now().to_rfc3339(),
            content: if change.version.deleted { None } else { Some(change.version.content.clone()) },
        }
    }
}

pub struct Pipeline {
    root: PathBuf,
    store: Store,
    hub: Arc<SseHub>,
    debounce_window: Duration,
    monitoring_enabled: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(
        root: PathBuf,
        store: Store,
        hub: Arc<SseHub>,
        debounce_window: Duration,
        monitoring_enabled: Arc<AtomicBool>,
    ) -> Self {
        Pipeline {
            root,
            store,
            hub,
            debounce_window,
            monitoring_enabled,
        }
    }

    /// Starts the watcher and the async debounce/tracker/store chain. The
    /// returned `FileSystemWatcher` must be kept alive for the duration of
    /// the run; dropping it stops native event delivery. `/api/monitor/stop`
    /// does not tear this down -- it flips `monitoring_enabled` so tracked
    /// changes stop being persisted while the native watcher keeps running.
    pub fn spawn(self) -> ObbySpawnResult {
        let matcher = match PatternMatcher::load(&self.root) {
            Ok(m) => Arc::new(m),
            Err(e) => {
                return ObbySpawnResult::Failed(e);
            }
        };

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<RawChange>();
        let watcher = match FileSystemWatcher::spawn(&self.root, raw_tx) {
            Ok(w) => w,
            Err(e) => return ObbySpawnResult::Failed(e.into()),
        };

        let (debounced_tx, debounced_rx) = mpsc::unbounded_channel::<DebouncedChange>();
        let debouncer = Debouncer::new(self.debounce_window);
        tokio::spawn(debouncer.run(raw_rx, debounced_tx));

        let store = self.store.clone();
        let hub = self.hub.clone();
        let monitoring_enabled = self.monitoring_enabled.clone();
        let matcher_for_task = matcher.clone();
        let join = tokio::spawn(async move {
            process_debounced(debounced_rx, matcher_for_task, store, hub, monitoring_enabled).await;
        });

        ObbySpawnResult::Running { watcher, join, matcher }
    }
}

pub enum ObbySpawnResult {
    Running {
        watcher: FileSystemWatcher,
        join: tokio::task::JoinHandle<()>,
        /// Shared with the HTTP layer so `/api/watch-config/reload` can
        /// force an immediate reparse of the same rule set the pipeline
        /// consults -- `PatternMatcher` also hot-reloads on its own whenever
        /// either file's mtime changes.
        matcher: Arc<PatternMatcher>,
    },
    Failed(crate::error::ObbyError),
}

async fn process_debounced(
    mut rx: mpsc::UnboundedReceiver<DebouncedChange>,
    matcher: Arc<PatternMatcher>,
    store: Store,
    hub: Arc<SseHub>,
    monitoring_enabled: Arc<AtomicBool>,
) {
    let mut tracker = ContentTracker::new();
    while let Some(change) = rx.recv().await {
        if !monitoring_enabled.load(Ordering::SeqCst) {
            continue;
        }
        if let Some(reason) = matcher.should_skip(&change.path) {
            PipelineDiagnostic::skipped(change.path.to_string_lossy(), reason.description()).log();
            continue;
        }

        let tracked = match tracker.process(&change) {
            Ok(Some(t)) => t,
            Ok(None) => continue,
            Err(e) => {
                PipelineDiagnostic::error(
                    Some(change.path.to_string_lossy().to_string()),
                    PipelineStage::ContentHash,
                    e.to_string(),
                )
                .log();
                continue;
            }
        };

        if let Err(e) = store.record_change(&tracked) {
            PipelineDiagnostic::error(
                Some(tracked.version.path.clone()),
                PipelineStage::Store,
                e.to_string(),
            )
            .log();
            continue;
        }

        let notification = ChangeNotification::from(&tracked);
        if let Ok(payload) = serde_json::to_string(&notification) {
            if let Err(e) = store.record_event("file_updated", &payload) {
                PipelineDiagnostic::error(Some(tracked.version.path.clone()), PipelineStage::Store, e.to_string()).log();
            }
        }
        hub.broadcast_change(&notification);
    }
}

/// Helper used by `init` to distinguish "created vs modified" without a
/// live pipeline -- not otherwise needed since `DebouncedKind` only ever
/// carries `Created` immediately after a rename's synthetic removal.
pub fn is_creation(kind: &DebouncedKind) -> bool {
    matches!(kind, DebouncedKind::Created)
}
