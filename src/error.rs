//! Error types for gemgate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type alias for gemgate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Request-path error type for gemgate. Startup failures (configuration,
/// account pool) surface through their own error types before the server
/// ever runs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Model '{model}' is not supported")]
    InvalidModel { model: String },

    #[error("No usable credential is configured")]
    NoCredential,

    #[error("Upstream returned {status}")]
    Upstream { status: u16, body: String },

    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            // Upstream failures pass through verbatim: the caller gets the
            // exact vendor status and body, untranslated.
            Error::Upstream { status, body } => {
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                (status, body).into_response()
            }
            other => {
                let status = match &other {
                    Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                    Error::InvalidModel { .. } => StatusCode::BAD_REQUEST,
                    Error::NoCredential => StatusCode::UNAUTHORIZED,
                    Error::Upstream { .. } => StatusCode::BAD_GATEWAY,
                    Error::Transport(_) => StatusCode::BAD_GATEWAY,
                    Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };

                // Return OpenAI-compatible error format
                let body = serde_json::json!({
                    "error": {
                        "message": other.to_string(),
                        "type": "gemgate_error",
                        "code": status.as_u16()
                    }
                });

                (status, axum::Json(body)).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_passes_status_and_body_through() {
        let err = Error::Upstream {
            status: 403,
            body: "quota exhausted for this account".to_string(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_invalid_model_maps_to_400() {
        let err = Error::InvalidModel {
            model: "gpt-4o".to_string(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_no_credential_maps_to_401() {
        let response = Error::NoCredential.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_unknown_upstream_status_falls_back_to_502() {
        let err = Error::Upstream {
            status: 0,
            body: String::new(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
