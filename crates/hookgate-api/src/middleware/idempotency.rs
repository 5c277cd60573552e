//! Response replay keyed by `X-Idempotency-Key` (IdempotencyCache).
//!
//! The first successful response produced for a key is snapshotted and
//! replayed verbatim, original record id included, to every later mutating
//! request carrying the same key. Entries are kept for a fixed retention
//! window and swept opportunistically on each cache access.
//!
//! The cache is an optimisation only. Uniqueness of the persisted record is
//! guaranteed by the store, so a cold, evicted or per-instance cache never
//! causes a second record to be written.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use hookgate_core::Clock;
use tracing::{debug, info};

use crate::{error::ApiError, middleware::signature::is_mutating, AppState};

/// Header carrying the client-chosen idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";

/// Default retention window for cached responses.
pub fn default_retention() -> Duration {
    Duration::hours(24)
}

/// Captured response, replayed byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSnapshot {
    /// Original status.
    pub status: StatusCode,
    /// Original content type, if any.
    pub content_type: Option<HeaderValue>,
    /// Original body.
    pub body: Bytes,
}

impl ResponseSnapshot {
    /// Rebuilds an HTTP response from the snapshot.
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(Body::from(self.body.clone()));
        *response.status_mut() = self.status;
        if let Some(content_type) = &self.content_type {
            response.headers_mut().insert(CONTENT_TYPE, content_type.clone());
        }
        response
    }
}

/// A cached response and when it was first stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyEntry {
    /// Idempotency key.
    pub key: String,
    /// Snapshot of the first successful response.
    pub response: ResponseSnapshot,
    /// When the snapshot was stored.
    pub created_at: DateTime<Utc>,
}

/// Time-bounded map from idempotency key to the response it produced.
pub struct IdempotencyCache {
    entries: Mutex<HashMap<String, IdempotencyEntry>>,
    retention: Duration,
    clock: Arc<dyn Clock>,
}

impl IdempotencyCache {
    /// Creates an empty cache with the given retention window.
    pub fn new(retention: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { entries: Mutex::new(HashMap::new()), retention, clock }
    }

    /// Returns the idempotency key when the cache applies to this request:
    /// a mutating method and a non-empty key header.
    pub fn applicable_key<'a>(method: &Method, headers: &'a HeaderMap) -> Option<&'a str> {
        if !is_mutating(method) {
            return None;
        }
        headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|key| !key.is_empty())
    }

    /// Returns the live entry for `key`, sweeping expired entries first.
    pub fn lookup(&self, key: &str) -> Option<IdempotencyEntry> {
        self.lock_and_sweep().get(key).cloned()
    }

    /// Stores a snapshot for `key` unless a live one already exists, and
    /// returns the entry that is now cached.
    ///
    /// The first stored snapshot wins so replays stay identical.
    pub fn store(&self, key: impl Into<String>, response: ResponseSnapshot) -> IdempotencyEntry {
        let created_at = self.clock.now();
        let key = key.into();
        let mut entries = self.lock_and_sweep();
        entries
            .entry(key.clone())
            .or_insert_with(|| IdempotencyEntry { key, response, created_at })
            .clone()
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, IdempotencyEntry>> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_and_sweep(&self) -> MutexGuard<'_, HashMap<String, IdempotencyEntry>> {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| now - entry.created_at <= self.retention);
        let swept = before - entries.len();
        if swept > 0 {
            debug!(swept, "Expired idempotency entries removed");
        }
        entries
    }
}

/// Axum middleware replaying cached responses for repeated keys.
///
/// Only 2xx responses are cached; failures are never replayed.
pub async fn idempotency_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(key) =
        IdempotencyCache::applicable_key(req.method(), req.headers()).map(str::to_string)
    else {
        return Ok(next.run(req).await);
    };

    if let Some(entry) = state.idempotency.lookup(&key) {
        info!(idempotency_key = %key, "Replaying cached response for idempotency key");
        return Ok(entry.response.to_response());
    }

    let response = next.run(req).await;
    if !response.status().is_success() {
        return Ok(response);
    }

    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to buffer response body: {e}")))?;

    state.idempotency.store(key, ResponseSnapshot {
        status: parts.status,
        content_type: parts.headers.get(CONTENT_TYPE).cloned(),
        body: bytes.clone(),
    });

    Ok(Response::from_parts(parts, Body::from(bytes)))
}
