//! HTTP/SSE API (§6), grounded in
//! `ferrex-server/src/routes/{mod.rs,v1.rs}`'s `AppState` + flat
//! `Router::new().route(...)` composition style.

mod chat;
mod files;
mod insights;
mod living_note;
mod search;
mod watch_config;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent::cancellation::CancellationRegistry;
use crate::agent::AgentOrchestrator;
use crate::config::Config;
use crate::living_note::LivingNote;
use crate::pattern::PatternMatcher;
use crate::sse::SseHub;
use crate::store::Store;
use crate::summarizer::BatchSummarizer;

#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub store: Store,
    pub hub: Arc<SseHub>,
    pub summarizer: Arc<BatchSummarizer>,
    pub living_note: Arc<LivingNote>,
    pub agent: Arc<AgentOrchestrator>,
    pub cancellations: Arc<CancellationRegistry>,
    /// Chat loops currently running as background tasks, keyed by session
    /// id, so `/api/chat/cancel` has a `JoinHandle` to hand to
    /// `CancellationRegistry::cancel`.
    pub running_chats: Arc<Mutex<HashMap<String, tokio::task::JoinHandle<()>>>>,
    pub insights: Arc<crate::insights::InsightsRegistry>,
    pub monitoring_enabled: Arc<AtomicBool>,
    pub config: Arc<Config>,
    pub matcher: Arc<PatternMatcher>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/monitor/start", post(monitor_start))
        .route("/api/monitor/stop", post(monitor_stop))
        .merge(files::router())
        .merge(living_note::router())
        .merge(search::router())
        .merge(insights::router())
        .merge(chat::router())
        .merge(watch_config::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn status(axum::extract::State(state): axum::extract::State<AppState>) -> axum::Json<serde_json::Value> {
    let subscriber_count = state.hub.subscriber_count();
    let monitoring = state.monitoring_enabled.load(std::sync::atomic::Ordering::SeqCst);
    axum::Json(serde_json::json!({
        "monitoring": monitoring,
        "watchedRoot": state.root,
        "sseSubscribers": subscriber_count,
    }))
}

async fn monitor_start(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<serde_json::Value> {
    state.monitoring_enabled.store(true, std::sync::atomic::Ordering::SeqCst);
    axum::Json(serde_json::json!({ "monitoring": true }))
}

async fn monitor_stop(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<serde_json::Value> {
    state.monitoring_enabled.store(false, std::sync::atomic::Ordering::SeqCst);
    axum::Json(serde_json::json!({ "monitoring": false }))
}
