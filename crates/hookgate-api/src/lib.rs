//! Webhook admission pipeline and HTTP API.
//!
//! Every inbound call passes, in order, the credential gate, the signature
//! gate (mutating requests only) and the idempotency cache before reaching
//! the ingestion service. All pipeline components are constructed once in
//! `AppState::new` and shared by reference across requests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use hookgate_core::{Clock, RecordStore};

pub mod config;
pub mod crypto;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod service;

pub use config::Config;
pub use crypto::SignatureVerifier;
pub use error::{ApiError, ErrorBody};
pub use gate::{DenialReason, GateOutcome};
pub use middleware::{
    auth::CredentialGate,
    idempotency::{IdempotencyCache, IdempotencyEntry, ResponseSnapshot},
    signature::SignatureGate,
};
pub use routes::{RoutePolicy, RouteTable};
pub use server::{create_router, create_router_with_timeout, start_server};
pub use service::{CreateWebhookRequest, Ingested, IngestionService};

/// Inputs needed to build the admission pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Expected `X-API-Key` value.
    pub api_key: String,
    /// HMAC signing secret.
    pub webhook_secret: String,
    /// Replay window of the idempotency cache.
    pub idempotency_ttl: chrono::Duration,
    /// Per-route admission policy.
    pub routes: RouteTable,
}

impl PipelineSettings {
    /// Settings with the default retention window and route table.
    pub fn new(api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            webhook_secret: webhook_secret.into(),
            idempotency_ttl: middleware::idempotency::default_retention(),
            routes: RouteTable::standard(),
        }
    }
}

/// Shared state handed to every middleware and handler.
#[derive(Clone)]
pub struct AppState {
    /// Record creation and lookup.
    pub service: IngestionService,
    /// Backing store, probed by the health check.
    pub store: Arc<dyn RecordStore>,
    /// API key gate.
    pub credentials: Arc<CredentialGate>,
    /// Body signature gate.
    pub signatures: Arc<SignatureGate>,
    /// Response replay cache.
    pub idempotency: Arc<IdempotencyCache>,
    /// Per-route admission policy.
    pub routes: Arc<RouteTable>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Builds every pipeline component from its settings.
    pub fn new(settings: PipelineSettings, store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            service: IngestionService::new(store.clone(), clock.clone()),
            credentials: Arc::new(CredentialGate::new(settings.api_key)),
            signatures: Arc::new(SignatureGate::new(SignatureVerifier::new(settings.webhook_secret))),
            idempotency: Arc::new(IdempotencyCache::new(settings.idempotency_ttl, clock.clone())),
            routes: Arc::new(settings.routes),
            store,
            clock,
        }
    }
}
