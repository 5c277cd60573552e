//! Test infrastructure for driving the webhook API in process.
//!
//! `TestEnv` wires the real admission pipeline over an in-memory store and a
//! manually advanced clock, so integration tests exercise the same router
//! the binary serves without any network or database.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::sync::{Arc, Once};

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use hookgate_api::{create_router, AppState, PipelineSettings};
use hookgate_core::InMemoryStore;
pub use hookgate_core::TestClock;
use serde_json::Value;
use tower::ServiceExt;

pub mod fixtures;

pub use fixtures::{stripe_payment, RequestBuilder};

/// API key configured in every `TestEnv`.
pub const TEST_API_KEY: &str = "test-api-key-12345";

/// Signing secret configured in every `TestEnv`.
pub const TEST_SECRET: &str = "test-webhook-secret";

static TRACING: Once = Once::new();

/// Installs a test-writer tracing subscriber once per process.
///
/// Honors `RUST_LOG`; silent by default.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

/// In-process test environment.
pub struct TestEnv {
    /// Deterministic clock shared with the pipeline.
    pub clock: TestClock,
    /// Store backing the pipeline.
    pub store: Arc<InMemoryStore>,
    /// Pipeline state; clones share every component.
    pub state: AppState,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    /// Environment with the test credentials and default settings.
    pub fn new() -> Self {
        Self::with_settings(PipelineSettings::new(TEST_API_KEY, TEST_SECRET))
    }

    /// Environment with custom pipeline settings.
    pub fn with_settings(settings: PipelineSettings) -> Self {
        init_tracing();

        let clock = TestClock::new();
        let store = Arc::new(InMemoryStore::new());
        let state = AppState::new(settings, store.clone(), Arc::new(clock.clone()));

        Self { clock, store, state }
    }

    /// Router over this environment's state.
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Signature of `body` under the test secret.
    pub fn sign(&self, body: &[u8]) -> String {
        self.state.signatures.verifier().generate(body)
    }

    /// Sends one request through a fresh router.
    ///
    /// # Errors
    ///
    /// Fails if the router errors or the body cannot be read.
    pub async fn send(&self, request: Request<Body>) -> Result<TestResponse> {
        let response = self.router().oneshot(request).await.context("router call failed")?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .context("failed to read response body")?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).context("response body is not JSON")?
        };

        Ok(TestResponse { status, headers, raw: bytes.to_vec(), body })
    }

    /// Builds and sends a request.
    ///
    /// # Errors
    ///
    /// See [`TestEnv::send`].
    pub async fn call(&self, request: RequestBuilder) -> Result<TestResponse> {
        self.send(request.build()).await
    }

    /// Number of persisted records.
    pub async fn record_count(&self) -> usize {
        self.store.len().await
    }
}

/// Buffered response.
#[derive(Debug, Clone)]
pub struct TestResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw body bytes.
    pub raw: Vec<u8>,
    /// Body parsed as JSON, `Null` when empty.
    pub body: Value,
}

impl TestResponse {
    /// Header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// `message` field of the body.
    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }

    /// `id` field of the body.
    pub fn id(&self) -> Option<&str> {
        self.body.get("id").and_then(Value::as_str)
    }
}
