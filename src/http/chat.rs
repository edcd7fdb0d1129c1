//! `/api/chat/*` -- the tool-using chat loop, grounded in
//! `original_source/routes/chat.py`: `/ping` is a readiness probe, `/message`
//! is a single-turn stateless reply, `/complete` runs the full history
//! through the bounded tool loop, `/cancel` stops a running `/complete` call
//! early, and `/tools` lists the registered tool schemas.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::agent::tools::ToolContext;
use crate::agent::{AgentEvent, Message};
use crate::error::{ObbyError, ObbyResult};

use super::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/chat/ping", get(ping))
        .route("/api/chat/message", post(single_message))
        .route("/api/chat/complete", post(complete))
        .route("/api/chat/cancel", post(cancel))
        .route("/api/chat/tools", get(tools))
}

async fn ping(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "available": true,
        "model": state.config.llm_model,
    }))
}

#[derive(Deserialize)]
struct SingleMessageRequest {
    message: String,
    session_id: Option<String>,
}

/// Stateless single-turn reply -- runs the bounded tool loop with a history
/// of exactly one user message rather than a raw, tool-free completion, so a
/// "what changed recently" question still resolves through the tool
/// registry.
async fn single_message(
    State(state): State<AppState>,
    Json(request): Json<SingleMessageRequest>,
) -> ObbyResult<Json<serde_json::Value>> {
    let message = request.message.trim().to_string();
    if message.is_empty() {
        return Err(ObbyError::Config("message is required".to_string()));
    }

    let conversation = vec![Message::user(message)];
    let ctx = ToolContext {
        root: state.root.clone(),
        store: state.store.clone(),
    };
    let outcome = state.agent.run_chat(conversation, &ctx, |_event| {}).await?;

    if let Some(session_id) = &request.session_id {
        state.store.ensure_agent_session(session_id, None)?;
        state
            .store
            .append_action_log(session_id, "assistant_response", &serde_json::json!({ "text": outcome.final_text }).to_string())?;
    }

    Ok(Json(serde_json::json!({
        "reply": outcome.final_text,
        "model": state.config.llm_model,
    })))
}

#[derive(Deserialize)]
struct CompleteRequest {
    messages: Vec<IncomingMessage>,
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct IncomingMessage {
    role: String,
    content: String,
    tool_call_id: Option<String>,
}

/// Runs the tool loop as a detached task so a concurrent `/api/chat/cancel`
/// call can abort it mid-flight; `session_id` is the key the task is
/// registered under in `state.running_chats`, and is required to make the
/// run cancellable at all (a session-less call still completes, it's just
/// not addressable for cancellation).
async fn complete(State(state): State<AppState>, Json(request): Json<CompleteRequest>) -> ObbyResult<Json<serde_json::Value>> {
    if request.messages.is_empty() {
        return Err(ObbyError::Config("messages must be a non-empty list".to_string()));
    }

    let conversation: Vec<Message> = request
        .messages
        .into_iter()
        .map(|m| Message {
            role: m.role,
            content: m.content,
            tool_call_id: m.tool_call_id,
        })
        .collect();

    let ctx = ToolContext {
        root: state.root.clone(),
        store: state.store.clone(),
    };
    let session_id = request.session_id.clone();
    let hub = state.hub.clone();
    let session_for_events = session_id.clone();
    let agent = state.agent.clone();

    let (result_tx, result_rx) = tokio::sync::oneshot::channel();
    let task = tokio::spawn(async move {
        let outcome = agent
            .run_chat(conversation, &ctx, move |event| {
                emit_progress(&hub, session_for_events.as_deref(), &event);
            })
            .await;
        let _ = result_tx.send(outcome);
    });

    if let Some(session_id) = &session_id {
        state.running_chats.lock().unwrap().insert(session_id.clone(), task);
    }

    let outcome = result_rx
        .await
        .map_err(|_| ObbyError::Config("chat was cancelled before it could reply".to_string()))??;

    if let Some(session_id) = &session_id {
        state.running_chats.lock().unwrap().remove(session_id);
        state.store.ensure_agent_session(session_id, None)?;
        for message in &outcome.conversation {
            state
                .store
                .append_action_log(session_id, &message.role, &serde_json::to_string(message)?)?;
        }
    }

    Ok(Json(serde_json::json!({
        "reply": outcome.final_text,
        "model": state.config.llm_model,
        "conversation": outcome.conversation,
        "toolsUsed": true,
    })))
}

#[derive(Deserialize)]
struct CancelRequest {
    session_id: String,
}

async fn cancel(State(state): State<AppState>, Json(request): Json<CancelRequest>) -> ObbyResult<Json<serde_json::Value>> {
    let task = state.running_chats.lock().unwrap().remove(&request.session_id);
    let Some(task) = task else {
        return Err(ObbyError::SessionNotFound(request.session_id));
    };

    let cancelled = state.cancellations.cancel(&request.session_id, task, None, None).await;
    if !cancelled {
        return Err(ObbyError::AlreadyCancelling(request.session_id));
    }

    Ok(Json(serde_json::json!({ "sessionId": request.session_id, "cancelled": true })))
}

fn emit_progress(hub: &crate::sse::SseHub, session_id: Option<&str>, event: &AgentEvent) {
    let payload = serde_json::json!({ "sessionId": session_id, "event": event });
    hub.broadcast("chat_progress", &payload.to_string());
}

async fn tools(State(state): State<AppState>) -> Json<serde_json::Value> {
    let definitions = state.agent.tool_definitions();
    Json(serde_json::json!({
        "toolNames": definitions.iter().map(|(name, _, _)| name).collect::<Vec<_>>(),
        "toolsAvailable": !definitions.is_empty(),
        "tools": definitions.into_iter().map(|(name, description, schema)| {
            serde_json::json!({ "name": name, "description": description, "schema": schema })
        }).collect::<Vec<_>>(),
    }))
}
