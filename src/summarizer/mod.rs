//! Scheduled batch summarizer, modeled on `ai/batch_processor.py`:
//! periodically pulls every file change recorded since the last successful
//! run, groups them by file, asks the configured LLM provider for a
//! markdown summary, and writes the result through `LivingNote` and the
//! semantic index. A run's cursor only advances once every sub-step
//! succeeds, so a failure reprocesses the same window next tick.

pub mod llm;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::ObbyResult;
use crate::living_note::LivingNote;
use crate::semantic;
use crate::sse::SseHub;
use crate::store::queries::DiffWindowEntry;
use crate::store::Store;
use llm::LlmProvider;

const CONFIG_LAST_UPDATE: &str = "living_note_last_update";
const CONFIG_LAST_FINGERPRINT: &str = "batch_last_fingerprint";
const CONFIG_MAX_BATCH_SIZE: &str = "ai_max_batch_size";
const DEFAULT_MAX_BATCH_SIZE: usize = 50;
const DEFAULT_WINDOW: &str = "1970-01-01T00:00:00Z";
const MAX_DIFF_EXCERPT: usize = 2000;

pub struct BatchSummarizer {
    store: Store,
    provider: Arc<dyn LlmProvider>,
    living_note: LivingNote,
    hub: Arc<SseHub>,
    /// Serializes runs so the scheduler never overlaps two ticks, even if
    /// one run outlives the interval.
    run_lock: Mutex<()>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    Updated { summary: String, files: usize },
    NoChanges,
    Dedup,
}

struct FileGroup {
    path: String,
    changes_count: usize,
    lines_added: i64,
    lines_removed: i64,
    excerpt: String,
}

impl BatchSummarizer {
    pub fn new(store: Store, provider: Arc<dyn LlmProvider>, living_note: LivingNote, hub: Arc<SseHub>) -> Self {
        BatchSummarizer {
            store,
            provider,
            living_note,
            hub,
            run_lock: Mutex::new(()),
        }
    }

    /// Runs on `interval` until cancelled. Each tick calls
    /// `process_batch(false)`; an HTTP-triggered "summarize now" should call
    /// `process_batch(true)` directly instead of waiting for the next tick.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.process_batch(false).await {
                tracing::warn!(error = %e, "batch summarization failed");
            }
        }
    }

    /// `force` bypasses the "nothing changed" short-circuit so a manual
    /// trigger always attempts a run, matching `process_batch(force)` in the
    /// original Python batch processor. Serialized via `run_lock` so at most
    /// one run executes at a time.
    pub async fn process_batch(&self, force: bool) -> ObbyResult<BatchOutcome> {
        let _guard = self.run_lock.lock().await;

        let window_start = self
            .store
            .config_get(CONFIG_LAST_UPDATE)?
            .unwrap_or_else(|| DEFAULT_WINDOW.to_string());
        let max_size = self.max_batch_size()?;

        let mut entries = self.store.changes_since_detailed(&window_start, max_size)?;
        entries.retain(|e| !self.living_note.is_living_note_path(std::path::Path::new(&e.path)));

        if entries.is_empty() {
            if force {
                self.advance_cursor(&window_start, &entries)?;
            }
            return Ok(BatchOutcome::NoChanges);
        }

        let groups = group_by_file(&entries);
        let fingerprint = compute_fingerprint(&groups);
        let previous_fingerprint = self.store.config_get(CONFIG_LAST_FINGERPRINT)?;
        if !force && previous_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            return Ok(BatchOutcome::Dedup);
        }

        let prompt = build_prompt(&groups);
        let completion = match self.provider.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "summarizer call failed, falling back to a metrics-only block");
                fallback_block(&groups)
            }
        };

        let extracted = semantic::extract(&completion);
        let considered_files: Vec<String> = groups.iter().map(|g| g.path.clone()).collect();
        let title = self.provider.model().to_string();
        let body = ensure_sources_section(&completion, &considered_files);

        let outcome = self.living_note.append_entry(&title, &body, &considered_files).await?;

        let file_impacts: Vec<semantic::Impact> =
            groups.iter().map(|g| semantic::impact_for_change_count(g.changes_count)).collect();
        let batch_impact = semantic::rollup_impact(&file_impacts);
        tracing::debug!(impact = batch_impact.as_str(), files = groups.len(), "batch impact rollup");

        for (group, impact) in groups.iter().zip(&file_impacts) {
            crate::living_note::record_semantic_entry(
                &self.store,
                &self.living_note,
                &outcome,
                &group.path,
                &extracted.summary,
                impact.as_str(),
                &extracted.topics,
                &extracted.keywords,
            )
            .await?;
        }

        self.store.config_set(CONFIG_LAST_FINGERPRINT, &fingerprint)?;
        self.advance_cursor(&window_start, &entries)?;

        self.hub.broadcast(
            "living_note_updated",
            &serde_json::to_string(&serde_json::json!({
                "path": outcome.note_path.to_string_lossy(),
                "timestamp": Utc::now().to_rfc3339(),
            }))
            .unwrap_or_default(),
        );

        Ok(BatchOutcome::Updated {
            summary: extracted.summary,
            files: groups.len(),
        })
    }

    fn advance_cursor(&self, previous: &str, entries: &[DiffWindowEntry]) -> ObbyResult<()> {
        let latest = entries
            .iter()
            .map(|e| e.created_at.as_str())
            .max()
            .unwrap_or(previous);
        self.store.config_set(CONFIG_LAST_UPDATE, latest)
    }

    fn max_batch_size(&self) -> ObbyResult<usize> {
        Ok(self
            .store
            .config_get(CONFIG_MAX_BATCH_SIZE)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_BATCH_SIZE))
    }
}

fn group_by_file(entries: &[DiffWindowEntry]) -> Vec<FileGroup> {
    let mut by_path: BTreeMap<&str, FileGroup> = BTreeMap::new();
    for entry in entries {
        let group = by_path.entry(entry.path.as_str()).or_insert_with(|| FileGroup {
            path: entry.path.clone(),
            changes_count: 0,
            lines_added: 0,
            lines_removed: 0,
            excerpt: String::new(),
        });
        group.changes_count += 1;
        group.lines_added += entry.lines_added;
        group.lines_removed += entry.lines_removed;
        if let Some(diff) = &entry.diff_text {
            if group.excerpt.len() < MAX_DIFF_EXCERPT {
                group.excerpt.push_str(diff);
                group.excerpt.push('\n');
            }
        }
    }
    for group in by_path.values_mut() {
        group.excerpt.truncate(MAX_DIFF_EXCERPT);
    }
    by_path.into_values().collect()
}

fn compute_fingerprint(groups: &[FileGroup]) -> String {
    let total_changes: usize = groups.iter().map(|g| g.changes_count).sum();
    let combined_diff: String = groups.iter().map(|g| g.excerpt.as_str()).collect();
    let mut hasher = Sha256::new();
    hasher.update(groups.len().to_string());
    hasher.update(total_changes.to_string());
    hasher.update(combined_diff);
    hex::encode(hasher.finalize())
}

fn build_prompt(groups: &[FileGroup]) -> String {
    let mut prompt = String::from(
        "Emit 1-3 concise outcome bullets describing the changes below; \
         then a `### Sources` section listing the files with one-sentence rationales; \
         if the changes are trivial, emit exactly `- no meaningful changes`.\n\n",
    );
    for group in groups {
        prompt.push_str(&format!(
            "File: {} ({} change(s), +{}/-{})\n{}\n\n",
            group.path, group.changes_count, group.lines_added, group.lines_removed, group.excerpt
        ));
    }
    prompt
}

fn fallback_block(groups: &[FileGroup]) -> String {
    let mut block = String::from("- Metrics-only summary (summarizer unavailable)\n\n### Sources\n");
    for group in groups {
        block.push_str(&format!(
            "- `{}`: {} change(s), +{}/-{}\n",
            group.path, group.changes_count, group.lines_added, group.lines_removed
        ));
    }
    block
}

fn ensure_sources_section(completion: &str, considered_files: &[String]) -> String {
    if completion.contains("### Sources") || considered_files.is_empty() {
        completion.to_string()
    } else {
        let mut body = completion.to_string();
        body.push_str("\n\n### Sources\n");
        for file in considered_files {
            body.push_str(&format!("- `{file}`\n"));
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, kind: &str, created_at: &str) -> DiffWindowEntry {
        DiffWindowEntry {
            path: path.to_string(),
            change_kind: kind.to_string(),
            diff_text: Some("+added line\n".to_string()),
            lines_added: 1,
            lines_removed: 0,
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn group_by_file_aggregates_multiple_changes_to_the_same_path() {
        let entries = vec![
            entry("notes/a.md", "modified", "2026-07-01T00:00:00Z"),
            entry("notes/a.md", "modified", "2026-07-01T00:01:00Z"),
            entry("notes/b.md", "created", "2026-07-01T00:02:00Z"),
        ];
        let groups = group_by_file(&entries);
        assert_eq!(groups.len(), 2);
        let a = groups.iter().find(|g| g.path == "notes/a.md").unwrap();
        assert_eq!(a.changes_count, 2);
        assert_eq!(a.lines_added, 2);
    }

    #[test]
    fn fingerprint_is_stable_for_identical_input() {
        let entries = vec![entry("notes/a.md", "modified", "2026-07-01T00:00:00Z")];
        let groups = group_by_file(&entries);
        assert_eq!(compute_fingerprint(&groups), compute_fingerprint(&groups));
    }

    #[test]
    fn ensure_sources_section_appends_only_when_missing() {
        let with_sources = "- did a thing\n\n### Sources\n- `a.md`\n";
        assert_eq!(ensure_sources_section(with_sources, &["a.md".to_string()]), with_sources);

        let without = ensure_sources_section("- did a thing", &["a.md".to_string()]);
        assert!(without.contains("### Sources"));
        assert!(without.contains("a.md"));
    }
}
