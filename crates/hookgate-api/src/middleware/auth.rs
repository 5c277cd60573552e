//! API key authentication (CredentialGate).
//!
//! First gate in the pipeline. Public routes are admitted unconditionally;
//! everything else must present the configured key in `X-API-Key`.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::{
    crypto::timing_safe_eq,
    error::ApiError,
    gate::{DenialReason, GateOutcome},
    routes::{policy_for_request, RoutePolicy},
    AppState,
};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Checks caller credentials against the configured API key.
pub struct CredentialGate {
    api_key: String,
}

impl CredentialGate {
    /// Creates a gate for the given key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into() }
    }

    /// Decides whether the presented key admits the request.
    ///
    /// An empty header counts as absent. The comparison is constant-time.
    pub fn check(&self, presented: Option<&str>, policy: RoutePolicy) -> GateOutcome {
        if !policy.requires_auth {
            return GateOutcome::Admitted;
        }

        let Some(presented) = presented.filter(|key| !key.is_empty()) else {
            return GateOutcome::Denied(DenialReason::CredentialRequired);
        };

        if timing_safe_eq(presented.as_bytes(), self.api_key.as_bytes()) {
            GateOutcome::Admitted
        } else {
            GateOutcome::Denied(DenialReason::InvalidCredential)
        }
    }
}

/// Extracts the API key from `X-API-Key`.
fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok())
}

/// Axum middleware running the credential gate.
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let policy = policy_for_request(&state.routes, &req);

    match state.credentials.check(extract_api_key(req.headers()), policy) {
        GateOutcome::Admitted => {
            debug!("Credential gate admitted request");
            Ok(next.run(req).await)
        },
        GateOutcome::Denied(reason) => {
            warn!(%reason, "Credential gate denied request");
            Err(ApiError::denied(reason))
        },
    }
}
