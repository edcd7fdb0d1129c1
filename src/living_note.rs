//! Atomic composition and append of a rolling markdown note, grounded in
//! `original_source/services/living_note_service.py`'s write protocol --
//! compose the new session block in front of the existing file, write to a
//! sibling temp file, `fsync`, then rename over the target so the Watcher
//! never observes a half-written file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::ObbyResult;
use crate::store::Store;

const SETTLE_DELAY: std::time::Duration = std::time::Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivingNoteMode {
    Single,
    Daily,
}

/// Maintains the rolling note file(s) plus the "individual summary" output
/// directory used for the per-batch dual write.
pub struct LivingNote {
    root: PathBuf,
    mode: LivingNoteMode,
    output_dir: PathBuf,
}

pub struct AppendOutcome {
    pub note_path: PathBuf,
    pub individual_summary_path: PathBuf,
}

impl LivingNote {
    pub fn new(root: PathBuf, mode: LivingNoteMode) -> Self {
        let output_dir = root.join("notes").join("summaries");
        LivingNote { root, mode, output_dir }
    }

    /// Resolves the active note file for `now`. Daily mode templates the
    /// filename with `{date}` in `YYYY-MM-DD`; single mode always returns
    /// the same path. Mode only affects path resolution, never the
    /// `living_note_last_update` cursor key.
    pub fn note_path(&self, now: DateTime<Utc>) -> PathBuf {
        match self.mode {
            LivingNoteMode::Single => self.root.join("notes").join("living_note.md"),
            LivingNoteMode::Daily => self
                .root
                .join("notes")
                .join("daily")
                .join(format!("{}.md", now.format("%Y-%m-%d"))),
        }
    }

    /// True if `path` (relative to the watched root, as stored in the
    /// change-tracking tables) is, or would be, a living-note file under
    /// either mode -- used to exclude the note's own diffs from the batch
    /// window, preventing the summarizer from summarizing its own writes.
    pub fn is_living_note_path(&self, path: &Path) -> bool {
        if path == Path::new("notes/living_note.md") {
            return true;
        }
        path.starts_with("notes/daily") && path.extension().is_some_and(|ext| ext == "md")
    }

    /// Composes and appends one session's summary to the rolling note,
    /// atomically, then writes a standalone "individual summary" file for
    /// the `SemanticEntry` dual write. On success, the caller persists a
    /// `SemanticEntry` pointing at `individual_summary_path`; if that write
    /// fails the caller must call [`LivingNote::compensate`] to delete the
    /// just-written file.
    pub async fn append_entry(&self, title: &str, body: &str, considered_files: &[String]) -> ObbyResult<AppendOutcome> {
        let now = Utc::now();
        let note_path = self.note_path(now);
        let session_block = render_session_block(title, body, considered_files, now);

        let existing = match tokio::fs::read_to_string(&note_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => boilerplate_header(self.mode),
            Err(e) => return Err(e.into()),
        };

        let new_content = format!("{session_block}\n\n---\n\n{existing}");
        atomic_write(&note_path, &new_content).await?;
        tokio::time::sleep(SETTLE_DELAY).await;

        let individual_summary_path = self.individual_summary_path(now, title);
        atomic_write(&individual_summary_path, &session_block).await?;

        Ok(AppendOutcome {
            note_path,
            individual_summary_path,
        })
    }

    /// Deletes the individual summary file written by a failed dual write.
    pub async fn compensate(&self, outcome: &AppendOutcome) -> ObbyResult<()> {
        match tokio::fs::remove_file(&outcome.individual_summary_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn individual_summary_path(&self, now: DateTime<Utc>, title: &str) -> PathBuf {
        let slug: String = title
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        self.output_dir
            .join(format!("{}-{}.md", now.format("%Y%m%dT%H%M%S"), slug))
    }
}

fn render_session_block(title: &str, body: &str, considered_files: &[String], now: DateTime<Utc>) -> String {
    let mut block = format!("## {title}\n*{}*\n\n{body}\n", now.format("%Y-%m-%d %H:%M UTC"));
    if !body.contains("### Sources") && !considered_files.is_empty() {
        block.push_str("\n### Sources\n");
        for file in considered_files {
            block.push_str(&format!("- `{file}`\n"));
        }
    }
    block
}

fn boilerplate_header(mode: LivingNoteMode) -> String {
    match mode {
        LivingNoteMode::Single => "# Living Note\n\n".to_string(),
        LivingNoteMode::Daily => "# Daily Note\n\n".to_string(),
    }
}

async fn atomic_write(path: &Path, content: &str) -> ObbyResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("md.tmp");
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    tokio::io::AsyncWriteExt::write_all(&mut file, content.as_bytes()).await?;
    file.sync_all().await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Convenience used by the summarizer: persists a `SemanticEntry` pointing
/// at `outcome.individual_summary_path`, compensating (deleting the file)
/// if the store write fails.
pub async fn record_semantic_entry(
    store: &Store,
    living_note: &LivingNote,
    outcome: &AppendOutcome,
    path: &str,
    summary: &str,
    impact: &str,
    topics: &[String],
    keywords: &[String],
) -> ObbyResult<i64> {
    let markdown_path = outcome.individual_summary_path.to_string_lossy().to_string();
    match store.insert_semantic_entry_with_markdown(path, summary, Some(impact), Some(&markdown_path), topics, keywords) {
        Ok(id) => Ok(id),
        Err(e) => {
            living_note.compensate(outcome).await?;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn single_mode_always_resolves_the_same_path() {
        let dir = TempDir::new().unwrap();
        let note = LivingNote::new(dir.path().to_path_buf(), LivingNoteMode::Single);
        let a = note.note_path(Utc::now());
        let b = note.note_path(Utc::now());
        assert_eq!(a, b);
        assert!(note.is_living_note_path(Path::new("notes/living_note.md")));
    }

    #[test]
    fn daily_mode_templates_the_filename_with_the_date() {
        let dir = TempDir::new().unwrap();
        let note = LivingNote::new(dir.path().to_path_buf(), LivingNoteMode::Daily);
        let now = Utc::now();
        let path = note.note_path(now);
        assert!(path.to_string_lossy().contains(&now.format("%Y-%m-%d").to_string()));
        assert!(note.is_living_note_path(Path::new("notes/daily/2026-07-28.md")));
        assert!(!note.is_living_note_path(Path::new("notes/other.md")));
    }

    #[tokio::test]
    async fn append_entry_creates_the_note_and_an_individual_summary() {
        let dir = TempDir::new().unwrap();
        let note = LivingNote::new(dir.path().to_path_buf(), LivingNoteMode::Single);
        let outcome = note
            .append_entry("Refactored the tracker", "- Reworked diffing", &["src/tracker.rs".to_string()])
            .await
            .unwrap();
        let content = tokio::fs::read_to_string(&outcome.note_path).await.unwrap();
        assert!(content.contains("Refactored the tracker"));
        assert!(tokio::fs::metadata(&outcome.individual_summary_path).await.is_ok());
    }

    #[tokio::test]
    async fn second_append_prepends_above_the_first_entry() {
        let dir = TempDir::new().unwrap();
        let note = LivingNote::new(dir.path().to_path_buf(), LivingNoteMode::Single);
        note.append_entry("First", "body one", &[]).await.unwrap();
        let outcome = note.append_entry("Second", "body two", &[]).await.unwrap();
        let content = tokio::fs::read_to_string(&outcome.note_path).await.unwrap();
        assert!(content.find("Second").unwrap() < content.find("First").unwrap());
    }
}
