//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ChatListResponse, CreateChatResponse, ErrorResponse, PurchaseRequest, SendMessageRequest,
    UiStateResponse,
};
use super::{request_auth, AppState};
use crate::runtime::{PurchaseReceipt, Session, SessionError};
use crate::stream::UiEntry;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chats", get(list_chats).post(create_chat))
        .route("/api/chats/:id/messages", post(send_message))
        .route("/api/chats/:id/purchase", post(confirm_purchase))
        .route("/api/chats/:id/ui", get(get_ui_state))
        .route("/api/chats/:id/stream", get(stream_chat))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Chats
// ============================================================

async fn create_chat(State(state): State<AppState>) -> Json<CreateChatResponse> {
    let session = state.manager.create().await;
    Json(CreateChatResponse {
        chat_id: session.chat_id().to_string(),
    })
}

async fn list_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ChatListResponse>, AppError> {
    let auth = request_auth(&headers);
    let chats = state
        .manager
        .list(auth.as_ref())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Sign in to see saved chats".to_string()))?;
    Ok(Json(ChatListResponse { chats }))
}

async fn find_session(
    state: &AppState,
    id: &str,
    headers: &HeaderMap,
) -> Result<Arc<Session>, AppError> {
    let auth = request_auth(headers);
    state
        .manager
        .resume(id, auth.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Chat not found: {id}")))
}

// ============================================================
// Actions
// ============================================================

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<UiEntry>, AppError> {
    if req.content.trim().is_empty() {
        return Err(AppError::BadRequest("Message is empty".to_string()));
    }
    let session = find_session(&state, &id, &headers).await?;
    let turn = session
        .submit_user_message(req.content, request_auth(&headers))
        .await?;
    Ok(Json(turn.entry))
}

async fn confirm_purchase(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PurchaseRequest>,
) -> Result<Json<PurchaseReceipt>, AppError> {
    let session = find_session(&state, &id, &headers).await?;
    let receipt = session
        .confirm_purchase(&req.symbol, req.price, req.amount, request_auth(&headers))
        .await?;
    Ok(Json(receipt))
}

// ============================================================
// Views
// ============================================================

async fn get_ui_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<UiStateResponse>, AppError> {
    let session = find_session(&state, &id, &headers).await?;
    let ui = session.ui_state(request_auth(&headers).as_ref()).await?;
    Ok(Json(UiStateResponse { ui }))
}

async fn stream_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let session = find_session(&state, &id, &headers).await?;
    let events = session.subscribe(request_auth(&headers).as_ref()).await?;
    tracing::debug!(chat_id = %id, "SSE subscriber connected");
    Ok(sse_stream(id, events))
}

async fn get_version() -> &'static str {
    concat!("triage-desk ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Busy => AppError::Conflict(e.to_string()),
            SessionError::ShuttingDown => AppError::Unavailable(e.to_string()),
            SessionError::InvalidRequest(msg) => AppError::BadRequest(msg),
            SessionError::NotOwner => AppError::NotFound("Chat not found".to_string()),
            SessionError::State(_) | SessionError::Persistence(_) => {
                tracing::error!(error = %e, "Request failed");
                AppError::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
