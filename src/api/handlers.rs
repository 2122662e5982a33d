//! API request handlers

use crate::chat::data_uri::DataUri;
use crate::chat::{ChatAdapter, ChatError, ChatRequest};
use crate::provider::ProviderError;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Shared server state
pub struct ServerState {
    pub adapter: ChatAdapter,
    /// Request body limit applied to the chat route
    pub max_request_bytes: usize,
}

pub type ChatServerState = Arc<ServerState>;

// ============================================================================
// Health check
// ============================================================================

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub provider: String,
    pub model: String,
}

pub async fn health(State(state): State<ChatServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        provider: state.adapter.provider_name().into(),
        model: state.adapter.config().model.clone(),
    })
}

// ============================================================================
// Chat
// ============================================================================

/// Reject submissions the adapter must never see.
fn validate_chat_request(req: &ChatRequest) -> Result<(), AppError> {
    if !req.has_content() {
        return Err(AppError::BadRequest(
            "A message or an image is required".into(),
        ));
    }
    if let Some(image) = &req.image_data {
        DataUri::parse(image)
            .and_then(|uri| uri.decoded_len())
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
    }
    Ok(())
}

/// Stream a model reply as `text/plain` UTF-8, one body chunk per model chunk.
///
/// Setup failures answer with a JSON error before any body byte. A failure
/// after streaming started aborts the body.
pub async fn chat(
    State(state): State<ChatServerState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    validate_chat_request(&req)?;
    info!(
        "Chat request: {} history turn(s), message {} chars, image={}",
        req.history.len(),
        req.message.chars().count(),
        req.image_data.is_some()
    );

    let relay = state.adapter.invoke_chat(&req).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        Body::from_stream(relay),
    )
        .into_response())
}

// ============================================================================
// Error handling
// ============================================================================

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    BadRequest(String),
    Unauthorized(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        let message = err.to_string();
        match err.provider_error() {
            ProviderError::Unauthorized { .. } => AppError::Unauthorized(message),
            ProviderError::BadRequest { .. } | ProviderError::InvalidPrompt(_) => {
                AppError::BadRequest(message)
            }
            _ => AppError::BadGateway(message),
        }
    }
}
