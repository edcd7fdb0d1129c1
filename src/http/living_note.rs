//! `/api/living-note*` -- current note content, a forced summarizer run, the
//! `single`/`daily` mode setting, and a dedicated SSE stream for
//! `living_note_updated` events.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::ObbyResult;

use super::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/living-note", get(current_note))
        .route("/api/living-note/clear", post(clear_note))
        .route("/api/living-note/update", post(force_update))
        .route("/api/living-note/settings", get(get_settings).post(set_settings))
        .route("/api/living-note/events", get(events))
}

async fn current_note(State(state): State<AppState>) -> ObbyResult<Json<serde_json::Value>> {
    let path = state.living_note.note_path(chrono::Utc::now());
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    Ok(Json(serde_json::json!({
        "path": path,
        "content": content,
    })))
}

/// Resets the active note back to its boilerplate header. This is a
/// convenience operational endpoint for an append-only note that otherwise
/// grows without bound, not part of the append protocol itself.
async fn clear_note(State(state): State<AppState>) -> ObbyResult<Json<serde_json::Value>> {
    let path = state.living_note.note_path(chrono::Utc::now());
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, b"").await?;
    Ok(Json(serde_json::json!({ "cleared": true })))
}

async fn force_update(State(state): State<AppState>) -> ObbyResult<Json<serde_json::Value>> {
    let outcome = state.summarizer.process_batch(true).await?;
    Ok(Json(serde_json::to_value(outcome).unwrap_or_default()))
}

#[derive(Deserialize)]
struct SettingsUpdate {
    ai_max_batch_size: Option<usize>,
}

async fn get_settings(State(state): State<AppState>) -> ObbyResult<Json<serde_json::Value>> {
    let max_batch_size = state.store.config_get("ai_max_batch_size")?;
    Ok(Json(serde_json::json!({
        "aiMaxBatchSize": max_batch_size.and_then(|v| v.parse::<usize>().ok()).unwrap_or(50),
    })))
}

async fn set_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> ObbyResult<Json<serde_json::Value>> {
    if let Some(size) = update.ai_max_batch_size {
        state.store.config_set("ai_max_batch_size", &size.to_string())?;
    }
    Ok(Json(serde_json::json!({ "updated": true })))
}

async fn events(
    State(state): State<AppState>,
) -> axum::response::Sse<impl futures_util::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>> {
    crate::sse::sse_stream(state.hub.subscribe())
}
