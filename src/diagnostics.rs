//! Structured diagnostics for the change-detection pipeline.
//!
//! Gives every stage (watch, debounce, pattern, hash, store) a deterministic,
//! sortable event type instead of ad hoc `tracing::warn!` strings, modeled on
//! the indexer's `watch_diagnostics` module.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stage in the pipeline where a diagnostic originated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Watch,
    Debounce,
    Pattern,
    ContentHash,
    Store,
    Summarize,
    LivingNote,
    Sse,
    Agent,
}

impl PipelineStage {
    fn sort_key(&self) -> u8 {
        match self {
            PipelineStage::Watch => 0,
            PipelineStage::Debounce => 1,
            PipelineStage::Pattern => 2,
            PipelineStage::ContentHash => 3,
            PipelineStage::Store => 4,
            PipelineStage::Summarize => 5,
            PipelineStage::LivingNote => 6,
            PipelineStage::Sse => 7,
            PipelineStage::Agent => 8,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            PipelineStage::Watch => "watching filesystem",
            PipelineStage::Debounce => "debouncing events",
            PipelineStage::Pattern => "matching patterns",
            PipelineStage::ContentHash => "hashing content",
            PipelineStage::Store => "writing to store",
            PipelineStage::Summarize => "summarizing batch",
            PipelineStage::LivingNote => "updating living note",
            PipelineStage::Sse => "delivering to subscribers",
            PipelineStage::Agent => "running agent",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A single diagnostic event, either a skip or a processing error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PipelineDiagnostic {
    Skipped {
        path: String,
        reason: String,
    },
    Error {
        path: Option<String>,
        stage: PipelineStage,
        message: String,
    },
}

impl PipelineDiagnostic {
    pub fn skipped(path: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineDiagnostic::Skipped {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn error(path: Option<String>, stage: PipelineStage, message: impl Into<String>) -> Self {
        PipelineDiagnostic::Error {
            path,
            stage,
            message: message.into(),
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            PipelineDiagnostic::Skipped { path, .. } => Some(path),
            PipelineDiagnostic::Error { path, .. } => path.as_deref(),
        }
    }

    fn sort_key(&self) -> (Option<&str>, u8, u8) {
        match self {
            PipelineDiagnostic::Error { path, stage, .. } => (path.as_deref(), 0, stage.sort_key()),
            PipelineDiagnostic::Skipped { path, .. } => (Some(path.as_str()), 1, 0),
        }
    }

    pub fn log(&self) {
        match self {
            PipelineDiagnostic::Skipped { path, reason } => {
                tracing::debug!(%path, %reason, "skipped");
            }
            PipelineDiagnostic::Error { path, stage, message } => {
                tracing::warn!(path = ?path, %stage, %message, "pipeline error");
            }
        }
    }
}

impl fmt::Display for PipelineDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineDiagnostic::Skipped { path, reason } => write!(f, "SKIP {}: {}", path, reason),
            PipelineDiagnostic::Error { path, stage, message } => {
                write!(f, "ERROR {}: {}: {}", path.as_deref().unwrap_or("<none>"), stage, message)
            }
        }
    }
}

impl PartialOrd for PipelineDiagnostic {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PipelineDiagnostic {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_sort_before_skips_for_same_path() {
        let err = PipelineDiagnostic::error(
            Some("notes/a.md".into()),
            PipelineStage::Store,
            "disk full",
        );
        let skip = PipelineDiagnostic::skipped("notes/a.md", "not matched by .obbywatch");
        let mut v = vec![skip.clone(), err.clone()];
        v.sort();
        assert_eq!(v[0], err);
        assert_eq!(v[1], skip);
    }

    #[test]
    fn display_format_matches_expected_shape() {
        let skip = PipelineDiagnostic::skipped("notes/a.md", "internal ignore rule");
        assert_eq!(skip.to_string(), "SKIP notes/a.md: internal ignore rule");
    }
}
