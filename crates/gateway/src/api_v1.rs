//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `GET  /api/v1/stream`               - SSE stream for a message passed as query params
//! - `POST /api/v1/chat/stream`          - SSE stream for a JSON body
//! - `POST /api/v1/chat_sync`            - run a cycle and return only the answer
//! - `POST /api/v1/sessions/{id}/reset`  - clear a session's history
//! - `GET  /api/v1/sessions/{id}`        - inspect a session's history
//! - `GET  /api/v1/tools`                - tool descriptors
//! - `GET  /api/v1/health`               - liveness

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use mediaclaw_agent::Orchestrator;
use mediaclaw_core::{HistorySnapshot, SessionError, SessionId, ToolDescriptor};

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub orchestrator: Orchestrator,
}

pub type SharedApiState = Arc<ApiV1State>;

impl ApiV1State {
    pub fn new(orchestrator: Orchestrator) -> SharedApiState {
        Arc::new(Self { orchestrator })
    }
}

pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/stream", get(stream_query_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/chat_sync", post(chat_sync_handler))
        .route("/sessions/{id}", get(get_session_handler))
        .route("/sessions/{id}/reset", post(reset_session_handler))
        .route("/tools", get(list_tools_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

// ── Request / response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatSyncResponse {
    pub response: String,
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub session_id: String,
    pub reset: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error surfaced to HTTP clients as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

/// Validate a message and resolve the session it belongs to.
fn parse_chat(session_id: Option<String>, message: &str) -> Result<SessionId, ApiError> {
    if message.trim().is_empty() {
        return Err(ApiError::bad_request("A non-empty 'message' is required"));
    }
    Ok(session_id
        .filter(|s| !s.trim().is_empty())
        .map(SessionId)
        .unwrap_or_default())
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// Claim the session and turn the cycle's events into SSE frames.
///
/// A busy session fails before the response starts, so the client gets a
/// plain 409 rather than a stream that ends immediately.
async fn open_stream(
    state: &ApiV1State,
    session_id: SessionId,
    message: String,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>> + use<>>, ApiError> {
    info!(session_id = %session_id, "Opening event stream");
    let rx = state.orchestrator.run_stream(session_id, message).await?;

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event.event_type()).data(data))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: String,
}

async fn stream_query_handler(
    State(state): State<SharedApiState>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>> + use<>>, ApiError> {
    let session_id = parse_chat(query.session_id, &query.message)?;
    open_stream(&state, session_id, query.message).await
}

async fn chat_stream_handler(
    State(state): State<SharedApiState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>> + use<>>, ApiError> {
    let session_id = parse_chat(req.session_id, &req.message)?;
    open_stream(&state, session_id, req.message).await
}

async fn chat_sync_handler(
    State(state): State<SharedApiState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatSyncResponse>, ApiError> {
    let session_id = parse_chat(req.session_id, &req.message)?;
    let reply = state.orchestrator.run(session_id, req.message).await?;
    if reply.response.is_empty() {
        warn!(session_id = %reply.session_id, "Cycle ended without a final answer");
    }
    Ok(Json(ChatSyncResponse {
        response: reply.response,
        session_id: reply.session_id.to_string(),
    }))
}

async fn reset_session_handler(State(state): State<SharedApiState>, Path(id): Path<String>) -> Json<ResetResponse> {
    let session_id = SessionId::from(id.as_str());
    state.orchestrator.sessions().reset(&session_id).await;
    Json(ResetResponse {
        session_id: session_id.to_string(),
        reset: true,
    })
}

async fn get_session_handler(State(state): State<SharedApiState>, Path(id): Path<String>) -> Json<HistorySnapshot> {
    Json(state.orchestrator.sessions().snapshot(&SessionId::from(id.as_str())).await)
}

async fn list_tools_handler(State(state): State<SharedApiState>) -> Json<Vec<ToolDescriptor>> {
    Json(state.orchestrator.tools().list_descriptors().to_vec())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}
