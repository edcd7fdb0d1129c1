//! `/api/files/*` -- recent events, paginated diffs, and watched-file
//! content read/write, plus the file-update SSE stream.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use rusqlite::params;
use serde::Deserialize;

use crate::error::{ObbyError, ObbyResult};
use crate::validation::{validate_new_path_within_root, validate_path_within_root, PathValidationError};

use super::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/files/events", get(recent_events))
        .route("/api/files/diffs", get(list_diffs))
        .route("/api/files/diffs/:id", get(get_diff))
        .route("/api/files/content/*path", get(read_content).put(write_content))
        .route("/api/files/updates/stream", get(stream_updates))
}

fn resolve_within_root(root: &std::path::Path, relative: &str) -> ObbyResult<std::path::PathBuf> {
    let joined = root.join(relative);
    validate_path_within_root(&joined, root).map_err(to_obby_error)
}

fn resolve_new_within_root(root: &std::path::Path, relative: &str) -> ObbyResult<std::path::PathBuf> {
    let joined = root.join(relative);
    validate_new_path_within_root(&joined, root).map_err(to_obby_error)
}

fn to_obby_error(e: PathValidationError) -> ObbyError {
    match e {
        PathValidationError::OutsideRoot(path, _)
        | PathValidationError::SymlinkEscape(path, _)
        | PathValidationError::SuspiciousTraversal(path)
        | PathValidationError::CannotCanonicalize(path) => ObbyError::PathEscape(path),
    }
}

#[derive(Deserialize)]
struct DiffQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    file_path: Option<String>,
}

async fn recent_events(State(state): State<AppState>) -> ObbyResult<Json<serde_json::Value>> {
    let rows: ObbyResult<Vec<(String, String, String)>> = state.store.with_connection(|conn| {
        let mut stmt = conn.prepare(
            "SELECT event_type, payload_json, created_at FROM events ORDER BY created_at DESC LIMIT 100",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    });
    let rows = rows?;
    Ok(Json(serde_json::json!({
        "events": rows.into_iter().map(|(event_type, payload, created_at)| {
            serde_json::json!({"type": event_type, "payload": serde_json::from_str::<serde_json::Value>(&payload).unwrap_or_default(), "createdAt": created_at})
        }).collect::<Vec<_>>()
    })))
}

async fn list_diffs(State(state): State<AppState>, Query(query): Query<DiffQuery>) -> ObbyResult<Json<serde_json::Value>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);

    let rows: ObbyResult<Vec<(i64, String, String, i64, i64, String)>> = state.store.with_connection(|conn| {
        let sql = if query.file_path.is_some() {
            "SELECT cd.id, fv.path, cd.diff_text, cd.lines_added, cd.lines_removed, cd.created_at
             FROM content_diffs cd JOIN file_versions fv ON fv.id = cd.file_version_id
             WHERE fv.path = ?1 ORDER BY cd.created_at DESC LIMIT ?2 OFFSET ?3"
        } else {
            "SELECT cd.id, fv.path, cd.diff_text, cd.lines_added, cd.lines_removed, cd.created_at
             FROM content_diffs cd JOIN file_versions fv ON fv.id = cd.file_version_id
             ORDER BY cd.created_at DESC LIMIT ?2 OFFSET ?3"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(
                params![query.file_path.clone().unwrap_or_default(), limit, offset],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    });

    let rows = rows?;
    Ok(Json(serde_json::json!({
        "diffs": rows.into_iter().map(|(id, path, diff_text, added, removed, created_at)| {
            serde_json::json!({
                "id": id, "path": path, "diff": diff_text,
                "linesAdded": added, "linesRemoved": removed, "createdAt": created_at,
            })
        }).collect::<Vec<_>>()
    })))
}

async fn get_diff(State(state): State<AppState>, Path(id): Path<i64>) -> ObbyResult<Json<serde_json::Value>> {
    let row: ObbyResult<Option<(String, String, i64, i64, String)>> = state.store.with_connection(|conn| {
        Ok(conn
            .query_row(
                "SELECT fv.path, cd.diff_text, cd.lines_added, cd.lines_removed, cd.created_at
                 FROM content_diffs cd JOIN file_versions fv ON fv.id = cd.file_version_id
                 WHERE cd.id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .ok())
    });

    match row? {
        Some((path, diff_text, added, removed, created_at)) => Ok(Json(serde_json::json!({
            "id": id, "path": path, "diff": diff_text,
            "linesAdded": added, "linesRemoved": removed, "createdAt": created_at,
        }))),
        None => Err(ObbyError::Other(anyhow::anyhow!("diff {id} not found"))),
    }
}

async fn read_content(State(state): State<AppState>, Path(path): Path<String>) -> ObbyResult<String> {
    let full = resolve_within_root(&state.root, &path)?;
    Ok(tokio::fs::read_to_string(&full).await?)
}

async fn write_content(State(state): State<AppState>, Path(path): Path<String>, body: String) -> ObbyResult<Json<serde_json::Value>> {
    let full = resolve_new_within_root(&state.root, &path)?;
    if let Some(parent) = full.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&full, body).await?;
    Ok(Json(serde_json::json!({ "written": true })))
}

async fn stream_updates(State(state): State<AppState>) -> axum::response::Sse<impl futures_util::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>> {
    crate::sse::sse_stream(state.hub.subscribe())
}
