//! Debouncing.
//!
//! Collapses bursts of filesystem events into one decision per path within a
//! rolling window, matching the indexer's `WatcherConfig::debounce_ms`
//! default of 500ms but with different coalescing rules than
//! `notify-debouncer-mini`: the latest event for a path wins within the
//! window, a delete short-circuits the window and flushes immediately (no
//! point waiting to see if the file reappears), and a rename/move keeps both
//! the source and destination paths as independent pending events (source
//! resolves to a removal, destination to a creation/modification).
//!
//! Before a settled `Modified` event is forwarded, its `(size, mtime)`
//! fingerprint is compared against the last one seen for that path -- if
//! neither changed, the event is dropped rather than waking up the tracker
//! to re-read and re-hash a file that didn't actually change on disk. A
//! fingerprint that can't be read (the path is gone, or never existed, as
//! in-memory tests exercise) fails open and forwards the event.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::interval;

use crate::tracker::FileFingerprint;
use crate::watcher::RawChange;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebouncedKind {
    Created,
    Modified,
    Removed,
}

#[derive(Debug, Clone)]
pub struct DebouncedChange {
    pub path: PathBuf,
    pub kind: DebouncedKind,
}

struct Pending {
    kind: DebouncedKind,
    last_seen: Instant,
}

pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, Pending>,
    fingerprints: HashMap<PathBuf, FileFingerprint>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Debouncer {
            window,
            pending: HashMap::new(),
            fingerprints: HashMap::new(),
        }
    }

    /// Applies the fingerprint gate to a settled event, updating the cache
    /// as a side effect. Returns `None` if a `Modified` event's `(size,
    /// mtime)` didn't actually change since the last time this path settled.
    fn gate(&mut self, path: PathBuf, kind: DebouncedKind) -> Option<DebouncedChange> {
        match kind {
            DebouncedKind::Removed => {
                self.fingerprints.remove(&path);
                Some(DebouncedChange { path, kind })
            }
            DebouncedKind::Created => {
                if let Ok(fp) = FileFingerprint::of(&path) {
                    self.fingerprints.insert(path.clone(), fp);
                }
                Some(DebouncedChange { path, kind })
            }
            DebouncedKind::Modified => match FileFingerprint::of(&path) {
                Ok(current) if self.fingerprints.get(&path) == Some(&current) => None,
                Ok(current) => {
                    self.fingerprints.insert(path.clone(), current);
                    Some(DebouncedChange { path, kind })
                }
                Err(_) => Some(DebouncedChange { path, kind }),
            },
        }
    }

    /// Drives the debounce loop until `rx` closes. Each settled path is sent
    /// once on `out` as a `DebouncedChange`.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RawChange>, out: mpsc::UnboundedSender<DebouncedChange>) {
        let mut ticker = interval(Duration::from_millis(50));
        loop {
            tokio::select! {
                maybe_change = rx.recv() => {
                    match maybe_change {
                        Some(change) => self.ingest(change, &out),
                        None => {
                            self.flush_all(&out);
                            return;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.flush_expired(&out);
                }
            }
        }
    }

    fn ingest(&mut self, change: RawChange, out: &mpsc::UnboundedSender<DebouncedChange>) {
        let now = Instant::now();
        match change {
            RawChange::Created(path) => self.upsert(path, DebouncedKind::Created, now),
            RawChange::Modified(path) => self.upsert(path, DebouncedKind::Modified, now),
            RawChange::Removed(path) => {
                // Deletes short-circuit: flush immediately rather than wait
                // out the window, since there is nothing further to coalesce.
                self.pending.remove(&path);
                if let Some(change) = self.gate(path, DebouncedKind::Removed) {
                    let _ = out.send(change);
                }
            }
            RawChange::Renamed { from, to } => {
                self.pending.remove(&from);
                if let Some(change) = self.gate(from, DebouncedKind::Removed) {
                    let _ = out.send(change);
                }
                self.upsert(to, DebouncedKind::Created, now);
            }
        }
    }

    fn upsert(&mut self, path: PathBuf, kind: DebouncedKind, now: Instant) {
        self.pending
            .entry(path)
            .and_modify(|p| {
                // Last-event-wins, except a prior Created stays Created even
                // if followed by a Modified within the same window -- the
                // store still needs to see it as a brand-new file.
                if p.kind != DebouncedKind::Created {
                    p.kind = kind.clone();
                }
                p.last_seen = now;
            })
            .or_insert(Pending { kind, last_seen: now });
    }

    fn flush_expired(&mut self, out: &mpsc::UnboundedSender<DebouncedChange>) {
        let window = self.window;
        let now = Instant::now();
        let expired: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.last_seen) >= window)
            .map(|(path, _)| path.clone())
            .collect();
        for path in expired {
            if let Some(p) = self.pending.remove(&path) {
                if let Some(change) = self.gate(path, p.kind) {
                    let _ = out.send(change);
                }
            }
        }
    }

    fn flush_all(&mut self, out: &mpsc::UnboundedSender<DebouncedChange>) {
        let drained: Vec<(PathBuf, Pending)> = self.pending.drain().collect();
        for (path, p) in drained {
            if let Some(change) = self.gate(path, p.kind) {
                let _ = out.send(change);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn repeated_modifications_collapse_to_one_event() {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let handle = tokio::spawn(debouncer.run(raw_rx, out_tx));

        raw_tx.send(RawChange::Modified(PathBuf::from("a.md"))).unwrap();
        tokio::time::advance(Duration::from_millis(100)).await;
        raw_tx.send(RawChange::Modified(PathBuf::from("a.md"))).unwrap();
        tokio::time::advance(Duration::from_millis(100)).await;
        raw_tx.send(RawChange::Modified(PathBuf::from("a.md"))).unwrap();

        tokio::time::advance(Duration::from_millis(600)).await;
        let change = out_rx.recv().await.unwrap();
        assert_eq!(change.path, PathBuf::from("a.md"));
        assert_eq!(change.kind, DebouncedKind::Modified);

        drop(raw_tx);
        handle.await.unwrap();
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn delete_short_circuits_the_window() {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let handle = tokio::spawn(debouncer.run(raw_rx, out_tx));

        raw_tx.send(RawChange::Modified(PathBuf::from("a.md"))).unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        raw_tx.send(RawChange::Removed(PathBuf::from("a.md"))).unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;

        let change = out_rx.recv().await.unwrap();
        assert_eq!(change.kind, DebouncedKind::Removed);

        drop(raw_tx);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn rename_emits_removal_for_source_and_creation_for_dest() {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let handle = tokio::spawn(debouncer.run(raw_rx, out_tx));

        raw_tx
            .send(RawChange::Renamed {
                from: PathBuf::from("old.md"),
                to: PathBuf::from("new.md"),
            })
            .unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        let removal = out_rx.recv().await.unwrap();
        assert_eq!(removal.path, PathBuf::from("old.md"));
        assert_eq!(removal.kind, DebouncedKind::Removed);

        tokio::time::advance(Duration::from_millis(600)).await;
        let creation = out_rx.recv().await.unwrap();
        assert_eq!(creation.path, PathBuf::from("new.md"));
        assert_eq!(creation.kind, DebouncedKind::Created);

        drop(raw_tx);
        handle.await.unwrap();
    }
}
