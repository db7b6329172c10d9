//! HTTP request handlers.

use axum::{
    body::{Body, Bytes},
    extract::{Extension, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::server::{AppState, RequestId};
use super::stream::sse_frames;
use super::types::{build_upstream_payload, to_chat_response, ChatCompletionRequest, SUPPORTED_MODELS};
use crate::error::Error;

/// Handle POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: Bytes,
) -> Result<Response, Error> {
    let start = std::time::Instant::now();

    if state.config.debug {
        tracing::debug!(body = %String::from_utf8_lossy(&body), "Received request body");
    }

    // Parse the body ourselves so every malformed request is a tagged 400.
    let request: ChatCompletionRequest =
        serde_json::from_slice(&body).map_err(|e| Error::InvalidRequest(e.to_string()))?;

    if !SUPPORTED_MODELS.contains(&request.model.as_str()) {
        return Err(Error::InvalidModel {
            model: request.model,
        });
    }

    // Snapshot the serving credential once; a rotation happening mid-request
    // cannot change what this request uses.
    let credential = state
        .store
        .active_credential()
        .await
        .ok_or(Error::NoCredential)?;

    tracing::info!(
        request_id = %request_id.0,
        model = %request.model,
        account = %credential.email,
        stream = request.stream,
        "Forwarding chat completion"
    );

    let payload = build_upstream_payload(&request);
    let upstream = state
        .upstream
        .generate(&credential, &payload, request.stream)
        .await?;

    let created = chrono::Utc::now().timestamp();

    if request.stream {
        let frames = sse_frames(upstream.bytes_stream(), &request.model, created);
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(frames))
            .map_err(|e| Error::Internal(e.to_string()))?;
        return Ok(response);
    }

    let data = upstream.json().await.map_err(Error::Transport)?;
    let response = to_chat_response(data, &request.model, created);

    tracing::info!(
        request_id = %request_id.0,
        model = %response.model,
        duration_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );

    Ok(Json(response).into_response())
}

/// Handle GET /v1/models - the fixed list the gateway accepts.
pub async fn list_models() -> impl IntoResponse {
    let models: Vec<serde_json::Value> = SUPPORTED_MODELS
        .iter()
        .map(|id| {
            serde_json::json!({
                "id": id,
                "object": "model",
                "created": 0,
                "owned_by": "google",
            })
        })
        .collect();

    Json(serde_json::json!({
        "object": "list",
        "data": models
    }))
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let credential = state.store.active_credential().await;
    let has_token = credential.is_some();
    let has_config_id = credential
        .as_ref()
        .map(|c| !c.config_id.is_empty())
        .unwrap_or(false);

    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "has_token": has_token,
            "has_config_id": has_config_id,
            "debug": state.config.debug,
        }
    }))
}
