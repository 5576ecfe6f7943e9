//! HTTP and WebSocket server

pub mod ws;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{Json, Router, extract::State, routing::get};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::session::SessionDeps;
use crate::{Error, Result};

/// Shared state for HTTP handlers and WebSocket sessions
pub struct AppState {
    pub deps: SessionDeps,
    /// Live WebSocket connection count
    pub connections: AtomicUsize,
}

impl AppState {
    /// Create server state around the session dependencies
    #[must_use]
    pub const fn new(deps: SessionDeps) -> Self {
        Self {
            deps,
            connections: AtomicUsize::new(0),
        }
    }
}

/// Build the full router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(api_status))
        .with_state(Arc::clone(&state))
        .merge(ws::router(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(Any)),
        )
}

/// Bind and serve until shutdown
///
/// # Errors
///
/// Returns error if the listener cannot bind or the server fails
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| Error::Config(format!("server error: {e}")))
}

/// Liveness check
#[allow(clippy::unused_async)]
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Connection count and per-stage latency summary
#[allow(clippy::unused_async)]
async fn api_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "connections": state.connections.load(Ordering::Relaxed),
        "latency": state.deps.metrics.summary(),
    }))
}
