//! obbywatch: a local observability pipeline for a watched note/code tree.
//!
//! Watches a directory, detects content-bearing edits, persists a
//! version-history with unified diffs, extracts semantic metadata via an
//! LLM, maintains a continuously updated rolling "living note," and exposes
//! HTTP/SSE APIs for a client UI and a tool-using chat agent.

pub mod agent;
pub mod config;
pub mod debounce;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod http;
pub mod insights;
pub mod living_note;
pub mod pattern;
pub mod semantic;
pub mod sse;
pub mod store;
pub mod summarizer;
pub mod tracker;
pub mod validation;
pub mod watcher;

pub use config::Config;
pub use error::{ObbyError, ObbyResult};
pub use events::{ChangeNotification, ObbySpawnResult, Pipeline};
pub use living_note::{LivingNote, LivingNoteMode};
pub use pattern::{PatternMatcher, SkipReason};
pub use sse::SseHub;
pub use store::Store;
pub use summarizer::llm::LlmProvider;
pub use summarizer::BatchSummarizer;
pub use validation::{
    canonicalize_path, validate_new_path_within_root, validate_path_within_root, PathValidationError,
};
pub use watcher::{FileSystemWatcher, RawChange};
