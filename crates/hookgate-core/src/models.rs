//! Domain models and strongly-typed identifiers.
//!
//! Defines the persisted webhook record, its lifecycle status, and the
//! filtering and pagination types shared by the store and the HTTP layer.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed webhook record identifier.
///
/// Wraps a UUID v4. The identifier is assigned once at ingestion and is the
/// value replayed to every caller that retries with the same idempotency key.
///
/// # Example
///
/// ```
/// use hookgate_core::models::RecordId;
/// let id = RecordId::new();
/// assert_eq!(id.0.get_version_num(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Creates a new random record ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RecordId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl sqlx::Type<PgDb> for RecordId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for RecordId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for RecordId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Record processing status.
///
/// The admission pipeline only ever writes `Pending`; transitions to the
/// terminal states belong to downstream processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Accepted and awaiting processing.
    Pending,
    /// Processed by a downstream consumer.
    Processed,
    /// Downstream processing failed.
    Failed,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processed => write!(f, "processed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid record status: {s}")),
        }
    }
}

impl sqlx::Type<PgDb> for RecordStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for RecordStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        s.parse::<Self>().map_err(Into::into)
    }
}

/// A persisted webhook delivery.
///
/// Created exactly once per accepted logical event. Two records that share a
/// non-null `idempotency_key` are always the same record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRecord {
    /// Unique identifier for this record.
    pub id: RecordId,

    /// Originating system, e.g. `stripe`.
    pub source: String,

    /// Event name as reported by the source.
    pub event: String,

    /// Opaque structured payload.
    pub payload: serde_json::Value,

    /// Caller-supplied signature, stored for audit.
    pub signature: Option<String>,

    /// Caller-supplied idempotency key. Unique when present.
    pub idempotency_key: Option<String>,

    /// When the record was accepted.
    pub received_at: DateTime<Utc>,

    /// Current processing status.
    pub status: RecordStatus,
}

impl WebhookRecord {
    /// Builds a fresh pending record with a new random identifier.
    pub fn new(
        source: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
        signature: Option<String>,
        idempotency_key: Option<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            source: source.into(),
            event: event.into(),
            payload,
            signature,
            idempotency_key,
            received_at,
            status: RecordStatus::Pending,
        }
    }
}

/// Exact-match filter applied when listing records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Only records from this source.
    pub source: Option<String>,
    /// Only records with this event name.
    pub event: Option<String>,
}

impl RecordFilter {
    /// Returns true when the record satisfies every populated criterion.
    pub fn matches(&self, record: &WebhookRecord) -> bool {
        self.source.as_deref().is_none_or(|s| s == record.source)
            && self.event.as_deref().is_none_or(|e| e == record.event)
    }
}

/// One-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number, starting at 1.
    pub page: u32,
    /// Maximum number of items per page.
    pub limit: u32,
}

impl PageRequest {
    /// Default page size used by the listing endpoint.
    pub const DEFAULT_LIMIT: u32 = 20;

    /// Creates a page request.
    pub const fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    /// Number of items to skip: `(page - 1) * limit`.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_LIMIT)
    }
}

/// Pagination metadata returned alongside a page of items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// Total number of matching items across all pages.
    pub total: u64,
    /// Requested page.
    pub page: u32,
    /// Requested page size.
    pub limit: u32,
    /// `ceil(total / limit)`.
    pub total_pages: u64,
}

impl PageMeta {
    /// Computes metadata for `total` items under the given request.
    pub fn new(total: u64, request: PageRequest) -> Self {
        let total_pages =
            if request.limit == 0 { 0 } else { total.div_ceil(u64::from(request.limit)) };

        Self { total, page: request.page, limit: request.limit, total_pages }
    }
}

/// A page of items with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub data: Vec<T>,
    /// Pagination metadata.
    pub meta: PageMeta,
}

impl<T> Page<T> {
    /// Creates a page from its items, the total match count and the request.
    pub fn new(data: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self { data, meta: PageMeta::new(total, request) }
    }

    /// Converts every item, keeping the metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page { data: self.data.into_iter().map(f).collect(), meta: self.meta }
    }
}
