//! Native filesystem watching.
//!
//! Runs `notify`'s native backend (inotify/FSEvents/ReadDirectoryChangesW) on
//! a dedicated OS thread, exactly as the indexer's `FileSystemWatcher` does,
//! and bridges raw events into async-land over a channel. Debouncing and
//! pattern filtering happen downstream (`crate::debounce`, `crate::pattern`)
//! rather than inside the watcher itself, since this crate's debounce
//! semantics (move keeps both paths, delete short-circuits) don't map onto
//! `notify-debouncer-mini`'s coalescing.
//!
//! The `polling-fallback` feature swaps the native backend for `notify`'s
//! `PollWatcher`, for filesystems (network mounts, some container overlays)
//! where the native backend doesn't deliver events reliably.

use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc as tokio_mpsc;

/// One filesystem observation, before debouncing.
#[derive(Debug, Clone)]
pub enum RawChange {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

impl RawChange {
    pub fn primary_path(&self) -> &Path {
        match self {
            RawChange::Created(p) | RawChange::Modified(p) | RawChange::Removed(p) => p,
            RawChange::Renamed { to, .. } => to,
        }
    }
}

pub struct FileSystemWatcher {
    _watcher: Box<dyn Watcher + Send>,
    join_handle: JoinHandle<()>,
}

/// Builds the native or polling backend behind one handler callback,
/// depending on the `polling-fallback` feature.
#[cfg(not(feature = "polling-fallback"))]
fn make_watcher(handler: impl notify::EventHandler) -> notify::Result<Box<dyn Watcher + Send>> {
    Ok(Box::new(notify::recommended_watcher(handler)?))
}

#[cfg(feature = "polling-fallback")]
fn make_watcher(handler: impl notify::EventHandler) -> notify::Result<Box<dyn Watcher + Send>> {
    let config = notify::Config::default().with_poll_interval(std::time::Duration::from_secs(2));
    Ok(Box::new(notify::PollWatcher::new(handler, config)?))
}

impl FileSystemWatcher {
    /// Starts watching `root` recursively, forwarding `RawChange`s to `tx`.
    /// The native watcher callback runs on notify's internal thread; we
    /// spawn a dedicated bridging thread (matching the indexer's pattern)
    /// that drains a std `mpsc::Receiver` and forwards into the async
    /// channel so the caller never blocks the tokio runtime on this thread.
    pub fn spawn(root: &Path, tx: tokio_mpsc::UnboundedSender<RawChange>) -> notify::Result<Self> {
        let (std_tx, std_rx) = std_mpsc::channel::<Event>();

        let mut watcher = make_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = std_tx.send(event);
            }
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        let join_handle = thread::Builder::new()
            .name("obbywatch-fs-bridge".to_string())
            .spawn(move || {
                while let Ok(event) = std_rx.recv() {
                    for change in translate_event(event) {
                        if tx.send(change).is_err() {
                            return;
                        }
                    }
                }
            })
            .expect("failed to spawn obbywatch-fs-bridge thread");

        Ok(FileSystemWatcher {
            _watcher: watcher,
            join_handle,
        })
    }

    /// Blocks until the bridging thread exits (only happens once the
    /// receiving end of the channel is dropped, i.e. on shutdown).
    pub fn join(self) {
        let _ = self.join_handle.join();
    }
}

fn translate_event(event: Event) -> Vec<RawChange> {
    match event.kind {
        EventKind::Create(_) => event.paths.into_iter().map(RawChange::Created).collect(),
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => match event.paths.len() {
            2 => vec![RawChange::Renamed {
                from: event.paths[0].clone(),
                to: event.paths[1].clone(),
            }],
            _ => event.paths.into_iter().map(RawChange::Modified).collect(),
        },
        EventKind::Modify(_) => event.paths.into_iter().map(RawChange::Modified).collect(),
        EventKind::Remove(_) => event.paths.into_iter().map(RawChange::Removed).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};

    fn event(kind: EventKind, paths: Vec<PathBuf>) -> Event {
        Event {
            kind,
            paths,
            attrs: Default::default(),
        }
    }

    #[test]
    fn create_event_becomes_created_change() {
        let e = event(EventKind::Create(CreateKind::File), vec![PathBuf::from("a.md")]);
        let changes = translate_event(e);
        assert!(matches!(changes.as_slice(), [RawChange::Created(p)] if p == Path::new("a.md")));
    }

    #[test]
    fn remove_event_becomes_removed_change() {
        let e = event(EventKind::Remove(RemoveKind::File), vec![PathBuf::from("a.md")]);
        let changes = translate_event(e);
        assert!(matches!(changes.as_slice(), [RawChange::Removed(p)] if p == Path::new("a.md")));
    }

    #[test]
    fn rename_both_event_becomes_renamed_change() {
        let e = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            vec![PathBuf::from("old.md"), PathBuf::from("new.md")],
        );
        let changes = translate_event(e);
        assert!(matches!(
            changes.as_slice(),
            [RawChange::Renamed { from, to }]
            if from == Path::new("old.md") && to == Path::new("new.md")
        ));
    }

    #[test]
    fn modify_data_event_becomes_modified_change() {
        let e = event(
            EventKind::Modify(ModifyKind::Data(notify::event::DataChange::Content)),
            vec![PathBuf::from("a.md")],
        );
        let changes = translate_event(e);
        assert!(matches!(changes.as_slice(), [RawChange::Modified(p)] if p == Path::new("a.md")));
    }
}
