//! `/api/watch-config/*` -- read/replace the `.obbywatch`/`.obbyignore` rule
//! files, force a reparse, and validate a candidate glob before saving it.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::ObbyResult;
use crate::pattern;

use super::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/watch-config/watch-patterns",
            get(get_watch_patterns).post(set_watch_patterns).delete(delete_watch_pattern),
        )
        .route(
            "/api/watch-config/ignore-patterns",
            get(get_ignore_patterns).post(set_ignore_patterns).delete(delete_ignore_pattern),
        )
        .route("/api/watch-config/reload", post(reload))
        .route("/api/watch-config/validate-pattern", post(validate))
}

async fn get_watch_patterns(State(state): State<AppState>) -> ObbyResult<Json<serde_json::Value>> {
    read_patterns(&state.config.obbywatch_file()).await
}

async fn get_ignore_patterns(State(state): State<AppState>) -> ObbyResult<Json<serde_json::Value>> {
    read_patterns(&state.config.obbyignore_file()).await
}

async fn read_patterns(path: &std::path::Path) -> ObbyResult<Json<serde_json::Value>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    let patterns: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();
    Ok(Json(serde_json::json!({ "patterns": patterns })))
}

#[derive(Deserialize)]
struct PatternsBody {
    patterns: Vec<String>,
}

async fn set_watch_patterns(State(state): State<AppState>, Json(body): Json<PatternsBody>) -> ObbyResult<Json<serde_json::Value>> {
    write_patterns(&state.config.obbywatch_file(), &body.patterns).await?;
    reload_matcher(&state)
}

async fn set_ignore_patterns(State(state): State<AppState>, Json(body): Json<PatternsBody>) -> ObbyResult<Json<serde_json::Value>> {
    write_patterns(&state.config.obbyignore_file(), &body.patterns).await?;
    reload_matcher(&state)
}

#[derive(Deserialize)]
struct DeletePatternQuery {
    pattern: String,
}

async fn delete_watch_pattern(
    State(state): State<AppState>,
    axum::extract::Query(query): axum::extract::Query<DeletePatternQuery>,
) -> ObbyResult<Json<serde_json::Value>> {
    remove_pattern(&state.config.obbywatch_file(), &query.pattern).await?;
    reload_matcher(&state)
}

async fn delete_ignore_pattern(
    State(state): State<AppState>,
    axum::extract::Query(query): axum::extract::Query<DeletePatternQuery>,
) -> ObbyResult<Json<serde_json::Value>> {
    remove_pattern(&state.config.obbyignore_file(), &query.pattern).await?;
    reload_matcher(&state)
}

async fn write_patterns(path: &std::path::Path, patterns: &[String]) -> ObbyResult<()> {
    let mut content = String::new();
    for pattern in patterns {
        content.push_str(pattern.trim());
        content.push('\n');
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}

async fn remove_pattern(path: &std::path::Path, pattern: &str) -> ObbyResult<()> {
    let existing = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let remaining: Vec<&str> = existing.lines().filter(|line| line.trim() != pattern).collect();
    tokio::fs::write(path, format!("{}\n", remaining.join("\n"))).await?;
    Ok(())
}

async fn reload(State(state): State<AppState>) -> ObbyResult<Json<serde_json::Value>> {
    reload_matcher(&state)
}

fn reload_matcher(state: &AppState) -> ObbyResult<Json<serde_json::Value>> {
    state.matcher.reload()?;
    Ok(Json(serde_json::json!({ "reloaded": true })))
}

#[derive(Deserialize)]
struct ValidateRequest {
    pattern: String,
}

async fn validate(Json(request): Json<ValidateRequest>) -> Json<serde_json::Value> {
    match pattern::validate_pattern(&request.pattern) {
        Ok(()) => Json(serde_json::json!({ "valid": true })),
        Err(message) => Json(serde_json::json!({ "valid": false, "error": message })),
    }
}
