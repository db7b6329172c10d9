//! HTTP server setup and configuration.

use std::sync::Arc;

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::handlers;
use super::upstream::UpstreamClient;
use crate::config::Config;
use crate::store::SharedStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub upstream: Arc<UpstreamClient>,
    pub config: Arc<Config>,
}

/// Correlation ID attached to every request.
#[derive(Clone, Copy)]
pub struct RequestId(pub Uuid);

/// Tag the request with a correlation ID and log its outcome.
async fn trace_request(mut request: Request, next: Next) -> Response {
    let request_id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(request_id);

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        request_id = %request_id.0,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Handled request"
    );

    response
}

/// Upper bound on concurrently handled requests.
const MAX_IN_FLIGHT: usize = 512;

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // OpenAI-compatible endpoints
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/models", get(handlers::list_models))
        .route("/health", get(handlers::health))
        // State and middleware
        .with_state(state)
        .layer(middleware::from_fn(trace_request))
        .layer(TraceLayer::new_for_http())
        .layer(GlobalConcurrencyLimitLayer::new(MAX_IN_FLIGHT))
}

/// Run the HTTP server until the process is stopped.
pub async fn run_server(config: Arc<Config>, store: SharedStore) -> anyhow::Result<()> {
    let upstream = Arc::new(UpstreamClient::new(&config)?);
    let state = AppState {
        store,
        upstream,
        config: config.clone(),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    tracing::info!(address = %config.listen, "Starting gemgate server");

    axum::serve(listener, app).await?;

    Ok(())
}
