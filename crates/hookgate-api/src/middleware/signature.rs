//! HMAC body signature verification (SignatureGate).
//!
//! Second gate in the pipeline. Only mutating verbs are checked, and only on
//! routes whose policy requires it. The signature is computed over the raw
//! request bytes exactly as received, captured before any JSON parsing, so
//! key order or whitespace in the sender's serialisation cannot break a
//! legitimate signature.

use std::error::Error as _;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use http_body_util::LengthLimitError;
use tracing::{debug, warn};

use crate::{
    crypto::SignatureVerifier,
    error::ApiError,
    gate::{DenialReason, GateOutcome},
    routes::{policy_for_request, RoutePolicy},
    AppState,
};

/// Header carrying the hex HMAC-SHA256 of the body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Largest body buffered for signature verification.
pub const MAX_SIGNED_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Returns true for verbs that change server state.
pub fn is_mutating(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Checks request bodies against caller-supplied signatures.
#[derive(Debug, Clone)]
pub struct SignatureGate {
    verifier: SignatureVerifier,
}

impl SignatureGate {
    /// Creates a gate around the given verifier.
    pub fn new(verifier: SignatureVerifier) -> Self {
        Self { verifier }
    }

    /// The verifier used by this gate.
    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    /// Decides whether `signature` admits a request with this method and body.
    pub fn check(
        &self,
        method: &Method,
        body: &[u8],
        policy: RoutePolicy,
        signature: Option<&str>,
    ) -> GateOutcome {
        if !policy.requires_signature || !is_mutating(method) {
            return GateOutcome::Admitted;
        }

        let Some(signature) = signature.filter(|s| !s.is_empty()) else {
            return GateOutcome::Denied(DenialReason::SignatureRequired);
        };

        if self.verifier.verify(body, signature) {
            GateOutcome::Admitted
        } else {
            GateOutcome::Denied(DenialReason::InvalidSignature)
        }
    }
}

/// Axum middleware running the signature gate.
///
/// Buffers the body, verifies it, then hands the same bytes on to the
/// handler.
pub async fn signature_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let policy = policy_for_request(&state.routes, &req);
    if !policy.requires_signature || !is_mutating(req.method()) {
        return Ok(next.run(req).await);
    }

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_SIGNED_BODY_BYTES).await.map_err(buffer_error)?;

    let signature = parts.headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let outcome = state.signatures.check(&parts.method, &bytes, policy, signature);

    match outcome {
        GateOutcome::Admitted => {
            debug!(body_len = bytes.len(), "Signature gate admitted request");
            Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
        },
        GateOutcome::Denied(reason) => {
            warn!(%reason, "Signature gate denied request");
            Err(ApiError::denied(reason))
        },
    }
}

/// Maps a body buffering failure: over the limit is 413, anything else
/// (an aborted upload, a broken stream) is 400.
fn buffer_error(err: axum::Error) -> ApiError {
    if exceeds_length_limit(&err) {
        warn!(limit = MAX_SIGNED_BODY_BYTES, "Request body exceeds signed body limit");
        ApiError::PayloadTooLarge
    } else {
        warn!(error = %err, "Failed to buffer request body for signature check");
        ApiError::BadRequest("Failed to read request body".to_string())
    }
}

fn exceeds_length_limit(err: &axum::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if cause.is::<LengthLimitError>() {
            return true;
        }
        source = cause.source();
    }
    false
}
