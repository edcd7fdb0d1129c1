//! `/api/insights/*` -- the registry's metadata/schema listing, on-demand
//! calculation for a date range, and the persisted widget layout.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{ObbyError, ObbyResult};

use super::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/insights/available", get(available))
        .route("/api/insights/schema", get(available))
        .route("/api/insights/calculate", get(calculate))
        .route("/api/insights/layout-config", get(get_layout).post(set_layout))
}

async fn available(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "insights": state.insights.list_metadata() }))
}

#[derive(Deserialize)]
struct CalculateQuery {
    id: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

async fn calculate(State(state): State<AppState>, Query(query): Query<CalculateQuery>) -> ObbyResult<Json<serde_json::Value>> {
    match state.insights.calculate(&query.id, query.start, query.end, &state.store) {
        Some(result) => Ok(Json(serde_json::to_value(result).unwrap_or_default())),
        None => Err(ObbyError::InsightNotFound(query.id)),
    }
}

async fn get_layout(State(state): State<AppState>) -> ObbyResult<Json<serde_json::Value>> {
    let layout = state.store.get_layout_config()?;
    Ok(Json(match layout {
        Some(json) => serde_json::from_str(&json).unwrap_or(serde_json::Value::Null),
        None => serde_json::Value::Null,
    }))
}

async fn set_layout(State(state): State<AppState>, Json(layout): Json<serde_json::Value>) -> ObbyResult<Json<serde_json::Value>> {
    let layout_json = serde_json::to_string(&layout)?;
    state.store.set_layout_config(&layout_json)?;
    Ok(Json(serde_json::json!({ "saved": true })))
}
