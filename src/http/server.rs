//! HTTP server bootstrap and shared application state.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::handlers;
use crate::config::GlobalConfig;
use crate::orchestrator::LifecycleOrchestrator;
use crate::persistence::SqlitePool;
use crate::{AppError, Result};

/// Shared application state accessible by all request handlers.
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// `SQLite` connection pool.
    pub db: Arc<SqlitePool>,
    /// Stack lifecycle orchestrator.
    pub orchestrator: LifecycleOrchestrator,
}

/// Handler for `GET /health`: returns 200 OK with a plain-text body.
async fn health() -> &'static str {
    "ok"
}

/// Build the API router over shared state.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/courses/{course}/users/{user}/view", post(handlers::view))
        .route(
            "/courses/{course}/users/{user}/status",
            post(handlers::status),
        )
        .route(
            "/courses/{course}/users/{user}/keepalive",
            post(handlers::keepalive),
        )
        .route(
            "/courses/{course}/users/{user}/terminal_url",
            post(handlers::terminal_url),
        )
        .with_state(state)
}

/// Start the HTTP API on `config.http_port`.
///
/// # Errors
///
/// Returns `AppError::Http` if the server fails to bind or serve.
pub async fn serve_http(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], state.config.http_port));
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Http(format!("failed to bind HTTP on {bind}: {err}")))?;
    serve_listener(listener, state, ct).await
}

/// Serve the HTTP API on an already-bound listener until `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Http` if the server fails.
pub async fn serve_listener(
    listener: TcpListener,
    state: Arc<AppState>,
    ct: CancellationToken,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|err| AppError::Http(format!("listener has no address: {err}")))?;
    info!(%addr, "starting HTTP API");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Http(format!("HTTP server error: {err}")))?;

    info!("HTTP API shut down");
    Ok(())
}
