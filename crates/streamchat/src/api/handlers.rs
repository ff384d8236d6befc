//! HTTP handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use streamchat_protocol::{ChatStreamRequest, Turn};
use tracing::{debug, instrument};

use super::error::ApiResult;
use super::sse;
use super::state::AppState;
use crate::chat::ChatMode;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[instrument(skip(state))]
pub async fn chat_stream_get(
    State(state): State<AppState>,
    Query(request): Query<ChatStreamRequest>,
) -> ApiResult<Response> {
    stream_turn(state, ChatMode::Chat, request).await
}

#[instrument(skip(state))]
pub async fn chat_stream_post(
    State(state): State<AppState>,
    Json(request): Json<ChatStreamRequest>,
) -> ApiResult<Response> {
    stream_turn(state, ChatMode::Chat, request).await
}

#[instrument(skip(state))]
pub async fn agent_stream_get(
    State(state): State<AppState>,
    Query(request): Query<ChatStreamRequest>,
) -> ApiResult<Response> {
    stream_turn(state, ChatMode::Agent, request).await
}

#[instrument(skip(state))]
pub async fn agent_stream_post(
    State(state): State<AppState>,
    Json(request): Json<ChatStreamRequest>,
) -> ApiResult<Response> {
    stream_turn(state, ChatMode::Agent, request).await
}

/// Committed history of a session, oldest first. Unknown sessions are empty.
#[instrument(skip(state))]
pub async fn session_turns(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<Vec<Turn>> {
    Json(state.chat.store().get(&session_id).await)
}

/// Start the turn before answering so start failures get a real status code,
/// then hand the event stream to a background task.
async fn stream_turn(
    state: AppState,
    mode: ChatMode,
    request: ChatStreamRequest,
) -> ApiResult<Response> {
    let turn = state.chat.start_turn(mode, request).await?;
    let (mut sink, body) = sse::channel();

    let chat = state.chat.clone();
    tokio::spawn(async move {
        let outcome = chat.stream_turn(turn, &mut sink).await;
        debug!(?outcome, "stream closed");
    });

    Ok(body.into_response())
}
