//! Content tracking and diff generation.
//!
//! Ported from the behavior of `file_tracker.py`'s `FileContentTracker`:
//! content is read with a UTF-8-then-lossy fallback, hashed after
//! normalizing line endings, and a unified diff is produced against the
//! previous version unless the diff would be a no-op (+0/-0), which the
//! Python implementation explicitly guards against via
//! `ContentDiffModel.should_create_diff`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use similar::{ChangeTag, TextDiff};

use crate::debounce::{DebouncedChange, DebouncedKind};

/// Cheap pre-validation fingerprint so unchanged files never get re-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFingerprint {
    pub size: u64,
    pub mtime: Option<SystemTime>,
}

impl FileFingerprint {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = fs::metadata(path)?;
        Ok(FileFingerprint {
            size: meta.len(),
            mtime: meta.modified().ok(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileVersion {
    pub path: String,
    pub content_hash: String,
    pub content: String,
    pub size: u64,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentDiff {
    pub diff_text: String,
    pub lines_added: usize,
    pub lines_removed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedChange {
    pub kind: ChangeKind,
    pub version: FileVersion,
    pub diff: Option<ContentDiff>,
}

/// Normalizes CRLF/CR to LF and hashes the result. Matches
/// `_calculate_content_hash` in `file_tracker.py`: empty content hashes to
/// the empty string, not `sha256("")`, so an absent file is distinguishable
/// from a genuinely empty one in the no-op gate below.
pub fn content_hash(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Reads file content, falling back to lossy UTF-8 decoding rather than
/// failing outright, matching `_read_file_safely`.
pub fn read_file_safely(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    match String::from_utf8(bytes.clone()) {
        Ok(s) => Ok(s),
        Err(_) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

/// Builds a unified diff between `old` and `new`, or `None` if the diff
/// would be a no-op (+0/-0 lines), mirroring `should_create_diff`.
pub fn build_diff(old: &str, new: &str) -> Option<ContentDiff> {
    let diff = TextDiff::from_lines(old, new);
    let mut added = 0usize;
    let mut removed = 0usize;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => added += 1,
            ChangeTag::Delete => removed += 1,
            ChangeTag::Equal => {}
        }
    }
    if added == 0 && removed == 0 {
        return None;
    }

    let mut text = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        text.push_str(sign);
        text.push_str(&change);
        if !text.ends_with('\n') {
            text.push('\n');
        }
    }

    Some(ContentDiff {
        diff_text: text,
        lines_added: added,
        lines_removed: removed,
    })
}

/// Tracks the last-known hash per path in memory so repeated saves of
/// identical content are gated out before any diff work happens (invariant:
/// "no-op gate").
#[derive(Default)]
pub struct ContentTracker {
    last_hash: std::collections::HashMap<PathBuf, String>,
    last_content: std::collections::HashMap<PathBuf, String>,
}

impl ContentTracker {
    pub fn new() -> Self {
        ContentTracker::default()
    }

    /// Processes one debounced change into a `TrackedChange`, or `None` if
    /// the content hash gate determined there is nothing new to record.
    pub fn process(&mut self, change: &DebouncedChange) -> std::io::Result<Option<TrackedChange>> {
        let rel_key = change.path.clone();
        match change.kind {
            DebouncedKind::Removed => {
                self.last_hash.remove(&rel_key);
                let previous = self.last_content.remove(&rel_key).unwrap_or_default();
                let diff = if previous.is_empty() {
                    None
                } else {
                    build_diff(&previous, "")
                };
                Ok(Some(TrackedChange {
                    kind: ChangeKind::Deleted,
                    version: FileVersion {
                        path: path_to_string(&rel_key),
                        content_hash: String::new(),
                        content: String::new(),
                        size: 0,
                        deleted: true,
                    },
                    diff,
                }))
            }
            DebouncedKind::Created | DebouncedKind::Modified => {
                if !change.path.is_file() {
                    // Vanished between debounce flush and processing; treat
                    // as a deletion rather than erroring the pipeline.
                    return self.process(&DebouncedChange {
                        path: change.path.clone(),
                        kind: DebouncedKind::Removed,
                    });
                }
                let content = read_file_safely(&change.path)?;
                let hash = content_hash(&content);

                if self.last_hash.get(&rel_key) == Some(&hash) {
                    return Ok(None);
                }

                let previous = self.last_content.get(&rel_key).cloned();
                let kind = if previous.is_none() {
                    ChangeKind::Created
                } else {
                    ChangeKind::Modified
                };
                let diff = previous.as_deref().and_then(|old| build_diff(old, &content));

                self.last_hash.insert(rel_key.clone(), hash.clone());
                self.last_content.insert(rel_key.clone(), content.clone());

                Ok(Some(TrackedChange {
                    kind,
                    version: FileVersion {
                        path: path_to_string(&rel_key),
                        content_hash: hash,
                        size: content.len() as u64,
                        content,
                        deleted: false,
                    },
                    diff,
                }))
            }
        }
    }
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_normalizes_line_endings() {
        let unix = content_hash("a\nb\n");
        let windows = content_hash("a\r\nb\r\n");
        let mac = content_hash("a\rb\r");
        assert_eq!(unix, windows);
        assert_eq!(unix, mac);
    }

    #[test]
    fn empty_content_hashes_to_empty_string() {
        assert_eq!(content_hash(""), "");
    }

    #[test]
    fn build_diff_returns_none_for_identical_content() {
        assert!(build_diff("same\n", "same\n").is_none());
    }

    #[test]
    fn build_diff_counts_added_and_removed_lines() {
        let diff = build_diff("one\ntwo\n", "one\nthree\nfour\n").unwrap();
        assert_eq!(diff.lines_removed, 1);
        assert_eq!(diff.lines_added, 2);
    }

    #[test]
    fn first_observation_of_a_path_is_a_creation_with_no_diff() {
        let mut tracker = ContentTracker::new();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, "hello\n").unwrap();

        let change = DebouncedChange {
            path: path.clone(),
            kind: DebouncedKind::Created,
        };
        let tracked = tracker.process(&change).unwrap().unwrap();
        assert_eq!(tracked.kind, ChangeKind::Created);
        assert!(tracked.diff.is_none());
    }

    #[test]
    fn repeated_identical_content_is_gated_out() {
        let mut tracker = ContentTracker::new();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, "hello\n").unwrap();

        let change = DebouncedChange {
            path: path.clone(),
            kind: DebouncedKind::Created,
        };
        assert!(tracker.process(&change).unwrap().is_some());

        let second = DebouncedChange {
            path,
            kind: DebouncedKind::Modified,
        };
        assert!(tracker.process(&second).unwrap().is_none());
    }

    #[test]
    fn modification_produces_a_diff_against_prior_content() {
        let mut tracker = ContentTracker::new();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, "hello\n").unwrap();
        tracker
            .process(&DebouncedChange {
                path: path.clone(),
                kind: DebouncedKind::Created,
            })
            .unwrap();

        fs::write(&path, "hello\nworld\n").unwrap();
        let tracked = tracker
            .process(&DebouncedChange {
                path,
                kind: DebouncedKind::Modified,
            })
            .unwrap()
            .unwrap();
        assert_eq!(tracked.kind, ChangeKind::Modified);
        assert!(tracked.diff.is_some());
        assert_eq!(tracked.diff.unwrap().lines_added, 1);
    }

    #[test]
    fn deletion_clears_cache_and_produces_removal_diff() {
        let mut tracker = ContentTracker::new();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, "hello\n").unwrap();
        tracker
            .process(&DebouncedChange {
                path: path.clone(),
                kind: DebouncedKind::Created,
            })
            .unwrap();

        fs::remove_file(&path).unwrap();
        let tracked = tracker
            .process(&DebouncedChange {
                path,
                kind: DebouncedKind::Removed,
            })
            .unwrap()
            .unwrap();
        assert_eq!(tracked.kind, ChangeKind::Deleted);
        assert!(tracked.version.deleted);
        assert!(tracked.diff.unwrap().lines_removed > 0);
    }
}
