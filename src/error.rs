//! Centralized error taxonomy.
//!
//! One `ObbyError` enum covers every fallible boundary in the process: the
//! watcher, the store, the summarizer, the agent, and the HTTP layer. This
//! mirrors the indexer's `anyhow::anyhow!(...)` wrapping style but collects
//! the variants in one place since this crate is one cohesive long-running
//! service rather than a CLI with many independent subcommands.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ObbyError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("filesystem watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("invalid pattern file {path}: {message}")]
    InvalidPattern { path: String, message: String },

    #[error("watch root has no active patterns: {0}")]
    NoActivePatterns(String),

    #[error("path escapes watch root: {0}")]
    PathEscape(String),

    #[error("llm provider error: {0}")]
    Llm(String),

    #[error("living note error: {0}")]
    LivingNote(String),

    #[error("agent session not found: {0}")]
    SessionNotFound(String),

    #[error("agent session already cancelling: {0}")]
    AlreadyCancelling(String),

    #[error("tool '{0}' not found")]
    ToolNotFound(String),

    #[error("insight '{0}' not found")]
    InsightNotFound(String),

    #[error("tool '{0}' failed: {1}")]
    ToolFailed(String, String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for ObbyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ObbyError::InvalidPattern { .. } => StatusCode::BAD_REQUEST,
            ObbyError::NoActivePatterns(_) => StatusCode::CONFLICT,
            ObbyError::PathEscape(_) => StatusCode::FORBIDDEN,
            ObbyError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ObbyError::ToolNotFound(_) => StatusCode::NOT_FOUND,
            ObbyError::InsightNotFound(_) => StatusCode::NOT_FOUND,
            ObbyError::AlreadyCancelling(_) => StatusCode::CONFLICT,
            ObbyError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(error = %self, "request failed");
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub type ObbyResult<T> = std::result::Result<T, ObbyError>;
