//! Webhook ingestion and retrieval handlers.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, Method, StatusCode, Uri},
    Json,
};
use chrono::{DateTime, Utc};
use hookgate_core::{Page, PageRequest, RecordFilter, RecordId, RecordStatus, WebhookRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::ApiError,
    middleware::{idempotency::IDEMPOTENCY_KEY_HEADER, signature::SIGNATURE_HEADER},
    service::CreateWebhookRequest,
    AppState,
};

/// Message returned for a newly accepted webhook.
pub const RECEIVED_MESSAGE: &str = "Webhook received";

/// Message returned when the idempotency key matched an existing record.
pub const DUPLICATE_MESSAGE: &str = "Webhook already processed (idempotent)";

/// Response body of `POST /webhooks`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateWebhookResponse {
    /// Record identifier.
    pub id: RecordId,
    /// Human-readable outcome.
    pub message: String,
}

/// Query parameters of `GET /webhooks`.
#[derive(Debug, Deserialize, Validate)]
pub struct ListQuery {
    /// One-based page number.
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "must not be less than 1"))]
    pub page: u32,

    /// Page size.
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100, message = "must be between 1 and 100"))]
    pub limit: u32,

    /// Exact source filter.
    pub source: Option<String>,

    /// Exact event filter.
    pub event: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    PageRequest::DEFAULT_LIMIT
}

/// Listing entry.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSummary {
    /// Record identifier.
    pub id: RecordId,
    /// Originating system.
    pub source: String,
    /// Event name.
    pub event: String,
    /// Processing status.
    pub status: RecordStatus,
    /// When the record was accepted.
    pub received_at: DateTime<Utc>,
}

impl From<WebhookRecord> for WebhookSummary {
    fn from(record: WebhookRecord) -> Self {
        Self {
            id: record.id,
            source: record.source,
            event: record.event,
            status: record.status,
            received_at: record.received_at,
        }
    }
}

/// Single record view. Signature and idempotency key are never exposed.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDetail {
    /// Record identifier.
    pub id: RecordId,
    /// Originating system.
    pub source: String,
    /// Event name.
    pub event: String,
    /// Stored payload.
    pub payload: serde_json::Value,
    /// Processing status.
    pub status: RecordStatus,
    /// When the record was accepted.
    pub received_at: DateTime<Utc>,
}

impl From<WebhookRecord> for WebhookDetail {
    fn from(record: WebhookRecord) -> Self {
        Self {
            id: record.id,
            source: record.source,
            event: record.event,
            payload: record.payload,
            status: record.status,
            received_at: record.received_at,
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// `POST /webhooks`
///
/// # Errors
///
/// 400 on a malformed or invalid body, 500 on storage failure.
#[instrument(name = "create_webhook", skip_all)]
pub async fn create_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateWebhookRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateWebhookResponse>), ApiError> {
    let Json(request) = body?;
    request.validate()?;

    let ingested = state
        .service
        .create(
            request,
            header_value(&headers, SIGNATURE_HEADER),
            header_value(&headers, IDEMPOTENCY_KEY_HEADER),
        )
        .await?;

    let message = if ingested.is_new { RECEIVED_MESSAGE } else { DUPLICATE_MESSAGE };
    Ok((
        StatusCode::CREATED,
        Json(CreateWebhookResponse { id: ingested.record.id, message: message.to_string() }),
    ))
}

/// `GET /webhooks`
///
/// # Errors
///
/// 400 on invalid paging parameters, 500 on storage failure.
#[instrument(name = "list_webhooks", skip_all)]
pub async fn list_webhooks(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Page<WebhookSummary>>, ApiError> {
    let Query(query) = query?;
    query.validate()?;

    let filter = RecordFilter { source: query.source, event: query.event };
    let page = state
        .service
        .find_all(filter, PageRequest::new(query.page, query.limit))
        .await?;

    debug!(returned = page.data.len(), total = page.meta.total, "Listed webhooks");
    Ok(Json(page.map(WebhookSummary::from)))
}

/// `GET /webhooks/{id}`
///
/// # Errors
///
/// 400 when `id` is not a UUID, 404 when no record has it.
#[instrument(name = "get_webhook", skip(state))]
pub async fn get_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WebhookDetail>, ApiError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::BadRequest("Validation failed (uuid is expected)".to_string()))?;

    let record = state.service.find_one(RecordId::from(id)).await?;
    Ok(Json(record.into()))
}

/// Fallback for unmatched routes.
pub async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::NotFound(format!("Cannot {method} {}", uri.path()))
}
