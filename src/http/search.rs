//! `/api/search` -- semantic search over the FTS-backed index.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::ObbyResult;

use super::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/search", get(search))
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
    limit: Option<usize>,
    #[serde(rename = "type")]
    type_filter: Option<String>,
}

async fn search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> ObbyResult<Json<serde_json::Value>> {
    let limit = query.limit.unwrap_or(20).clamp(1, 200);
    let results = state.store.search_semantic(&query.q, limit, query.type_filter.as_deref())?;
    Ok(Json(serde_json::json!({
        "results": results.into_iter().map(|(path, summary)| {
            serde_json::json!({ "path": path, "summary": summary })
        }).collect::<Vec<_>>()
    })))
}
