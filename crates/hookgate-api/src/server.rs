//! HTTP server configuration and request routing.
//!
//! Requests flow through middleware in order:
//! 1. Request ID assignment and error body rendering
//! 2. Request/response tracing
//! 3. Timeout enforcement
//! 4. Credential gate
//! 5. Signature gate
//! 6. Idempotent response replay
//! 7. Handler execution
//!
//! Steps 4 to 6 are route layers: they only run for matched routes, so
//! unknown paths fall straight through to the 404 fallback.
//!
//! # Graceful Shutdown
//!
//! The server handles SIGINT and SIGTERM by no longer accepting connections
//! and waiting for in-flight requests to finish.

use std::{net::SocketAddr, time::Duration};

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    handlers,
    middleware::{
        auth::auth_middleware, idempotency::idempotency_middleware,
        request_context::request_context,
        signature::{signature_middleware, MAX_SIGNED_BODY_BYTES},
    },
    AppState,
};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates the router with every route, the admission pipeline and the
/// default request timeout.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use hookgate_api::{create_router, AppState, PipelineSettings};
/// use hookgate_core::{InMemoryStore, SystemClock};
///
/// let settings = PipelineSettings::new("api-key", "signing-secret");
/// let state = AppState::new(settings, Arc::new(InMemoryStore::new()), Arc::new(SystemClock));
/// let app = create_router(state);
/// ```
pub fn create_router(state: AppState) -> Router {
    create_router_with_timeout(state, DEFAULT_REQUEST_TIMEOUT)
}

/// Creates the router with an explicit request timeout.
pub fn create_router_with_timeout(state: AppState, timeout: Duration) -> Router {
    Router::new()
        .route("/webhooks", post(handlers::create_webhook).get(handlers::list_webhooks))
        .route("/webhooks/{id}", get(handlers::get_webhook))
        .route("/health", get(handlers::health_check))
        // Last route layer added runs first.
        .route_layer(middleware::from_fn_with_state(state.clone(), idempotency_middleware))
        .route_layer(middleware::from_fn_with_state(state.clone(), signature_middleware))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .fallback(handlers::not_found)
        // Handlers parse the same bodies the signature gate buffers.
        .layer(DefaultBodyLimit::max(MAX_SIGNED_BODY_BYTES))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(state.clone(), request_context))
        .with_state(state)
}

/// Starts the HTTP server with graceful shutdown support.
///
/// # Errors
///
/// Returns `std::io::Error` if the address cannot be bound or serving fails.
pub async fn start_server(
    state: AppState,
    addr: SocketAddr,
    timeout: Duration,
) -> Result<(), std::io::Error> {
    let app = create_router_with_timeout(state, timeout);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("HTTP server listening on {}", actual_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

/// Waits for CTRL+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    warn!("Draining in-flight requests");
}
