//! Health check handler with a storage connectivity probe.

use std::{sync::Arc, time::Instant};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use hookgate_core::{Clock, RecordStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::AppState;

/// Health check response structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: HealthStatus,
    /// Timestamp when health check was performed
    pub timestamp: DateTime<Utc>,
    /// Individual component health checks
    pub checks: HealthChecks,
    /// Service version information
    pub version: String,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All components up
    Healthy,
    /// Storage unreachable
    Unhealthy,
}

/// Individual component health check results.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    /// Record store connectivity
    pub storage: ComponentHealth,
}

/// Health status for individual components.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    /// Component status
    pub status: ComponentStatus,
    /// Error message if down
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Probe duration in milliseconds
    pub response_time_ms: u64,
}

/// Component-level health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is healthy
    Up,
    /// Component is failing
    Down,
}

/// Runs health probes against the record store.
pub struct HealthService {
    clock: Arc<dyn Clock>,
}

impl HealthService {
    /// Creates a new health service with the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Probes the store and assembles the response.
    pub async fn health_check(&self, store: &dyn RecordStore) -> HealthResponse {
        debug!("Performing health check");

        let timestamp = self.clock.now();
        let started = Instant::now();

        let (status, message) = match store.health_check().await {
            Ok(()) => (ComponentStatus::Up, None),
            Err(e) => {
                error!(error = %e, "Storage health check failed");
                (ComponentStatus::Down, Some(format!("Storage check failed: {e}")))
            },
        };
        let elapsed = started.elapsed();

        HealthResponse {
            status: match status {
                ComponentStatus::Up => HealthStatus::Healthy,
                ComponentStatus::Down => HealthStatus::Unhealthy,
            },
            timestamp,
            checks: HealthChecks {
                storage: ComponentHealth {
                    status,
                    message,
                    response_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                },
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `GET /health`
///
/// 200 when healthy, 503 otherwise.
#[instrument(name = "health_check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let response = HealthService::new(state.clock.clone()).health_check(state.store.as_ref()).await;

    let status_code = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    debug!(status = ?response.status, storage = ?response.checks.storage.status, "Health check completed");

    (status_code, Json(response)).into_response()
}
