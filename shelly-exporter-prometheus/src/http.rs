//! HTTP server for the scrape endpoint.

use std::net::SocketAddr;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use thiserror::Error;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::fetcher::Fetcher;
use crate::scrape::{render_body, scrape_targets};

/// Query keys accepted for scrape targets.
const TARGET_KEYS: [&str; 2] = ["target[]", "target"];

/// Request-level failures, rendered as `{"detail": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No targets specified")]
    NoTargets,
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NoTargets => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    fetcher: Fetcher,
}

/// Create the HTTP router.
pub fn create_router(fetcher: Fetcher) -> Router {
    let state = AppState { fetcher };

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Collect non-empty target values from the query, in order.
fn requested_targets(params: Vec<(String, String)>) -> Vec<String> {
    params
        .into_iter()
        .filter(|(key, _)| TARGET_KEYS.contains(&key.as_str()))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

/// Handler for the /metrics endpoint.
async fn metrics_handler(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let targets = requested_targets(params);
    if targets.is_empty() {
        warn!("Scrape request without targets");
        return Err(ApiError::NoTargets);
    }

    let blocks = scrape_targets(&state.fetcher, &targets)
        .await
        .map_err(|e| {
            error!(error = %e, "Unexpected error while fetching metrics");
            ApiError::Internal(e.to_string())
        })?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        render_body(&blocks),
    )
        .into_response())
}

/// Handler for the /health endpoint.
async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// HTTP server configuration.
pub struct HttpServer {
    fetcher: Fetcher,
    listen_addr: SocketAddr,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(fetcher: Fetcher, listen_addr: SocketAddr) -> Self {
        Self {
            fetcher,
            listen_addr,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.fetcher);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(addr = %self.listen_addr, "HTTP server listening");

        // Run server with graceful shutdown
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
