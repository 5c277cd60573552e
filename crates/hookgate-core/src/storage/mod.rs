//! Persistence collaborator for accepted webhook records.
//!
//! The ingestion service only talks to storage through `RecordStore`. The
//! store's uniqueness constraint on the idempotency key is the authoritative
//! dedup boundary: `save` must reject a second record with an existing key
//! with `CoreError::ConstraintViolation` and write nothing.

use std::{future::Future, pin::Pin};

use crate::{
    error::Result,
    models::{Page, PageRequest, RecordFilter, RecordId, WebhookRecord},
};

pub mod memory;
pub mod postgres;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Storage operations required by the ingestion pipeline.
pub trait RecordStore: Send + Sync + 'static {
    /// Inserts a new record and returns it as stored.
    ///
    /// Fails with `ConstraintViolation` when another record already holds the
    /// same idempotency key. The insert is atomic: on failure nothing is
    /// written.
    fn save(&self, record: WebhookRecord) -> StoreFuture<'_, WebhookRecord>;

    /// Finds the record holding the given idempotency key.
    fn find_by_key(&self, key: String) -> StoreFuture<'_, Option<WebhookRecord>>;

    /// Finds a record by identifier.
    fn find_by_id(&self, id: RecordId) -> StoreFuture<'_, Option<WebhookRecord>>;

    /// Lists matching records, newest `received_at` first.
    fn list(&self, filter: RecordFilter, page: PageRequest)
        -> StoreFuture<'_, Page<WebhookRecord>>;

    /// Verifies the backend is reachable.
    fn health_check(&self) -> StoreFuture<'_, ()>;
}
