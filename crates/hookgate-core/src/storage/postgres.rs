//! PostgreSQL-backed record store.
//!
//! Idempotency is enforced by a `UNIQUE` constraint on
//! `webhook_records.idempotency_key`; a conflicting insert surfaces as
//! `CoreError::ConstraintViolation` through the `sqlx::Error` conversion.
//! Listing orders newest first, with the insertion sequence breaking ties
//! the same way the in-memory store does.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::debug;

use super::{RecordStore, StoreFuture};
use crate::{
    error::Result,
    models::{Page, PageRequest, RecordFilter, RecordId, WebhookRecord},
};

const SELECT_COLUMNS: &str =
    "id, source, event, payload, signature, idempotency_key, received_at, status";

/// Record store backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    /// Creates a new store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Returns a handle to the underlying pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Creates the records table and its indexes when missing.
    ///
    /// # Errors
    ///
    /// Returns error if any DDL statement fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS webhook_records (
                id UUID PRIMARY KEY,
                seq BIGSERIAL NOT NULL,
                source TEXT NOT NULL,
                event TEXT NOT NULL,
                payload JSONB NOT NULL,
                signature TEXT,
                idempotency_key TEXT UNIQUE,
                received_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'processed', 'failed'))
            )
            ",
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_webhook_records_received_at
            ON webhook_records(received_at DESC, seq DESC)
            ",
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_webhook_records_source_event
            ON webhook_records(source, event)
            ",
        )
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn insert(&self, record: WebhookRecord) -> Result<WebhookRecord> {
        let stored = sqlx::query_as::<_, WebhookRecord>(&format!(
            r"
            INSERT INTO webhook_records (
                id, source, event, payload, signature, idempotency_key, received_at, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {SELECT_COLUMNS}
            "
        ))
        .bind(record.id)
        .bind(&record.source)
        .bind(&record.event)
        .bind(&record.payload)
        .bind(&record.signature)
        .bind(&record.idempotency_key)
        .bind(record.received_at)
        .bind(record.status.to_string())
        .fetch_one(&*self.pool)
        .await?;

        debug!(record_id = %stored.id, "record inserted");
        Ok(stored)
    }

    async fn select_by_key(&self, key: &str) -> Result<Option<WebhookRecord>> {
        let record = sqlx::query_as::<_, WebhookRecord>(&format!(
            "SELECT {SELECT_COLUMNS} FROM webhook_records WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(record)
    }

    async fn select_by_id(&self, id: RecordId) -> Result<Option<WebhookRecord>> {
        let record = sqlx::query_as::<_, WebhookRecord>(&format!(
            "SELECT {SELECT_COLUMNS} FROM webhook_records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(record)
    }

    async fn select_page(
        &self,
        filter: &RecordFilter,
        page: PageRequest,
    ) -> Result<Page<WebhookRecord>> {
        let total: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM webhook_records
            WHERE ($1::TEXT IS NULL OR source = $1)
              AND ($2::TEXT IS NULL OR event = $2)
            ",
        )
        .bind(&filter.source)
        .bind(&filter.event)
        .fetch_one(&*self.pool)
        .await?;

        let data = sqlx::query_as::<_, WebhookRecord>(&format!(
            r"
            SELECT {SELECT_COLUMNS} FROM webhook_records
            WHERE ($1::TEXT IS NULL OR source = $1)
              AND ($2::TEXT IS NULL OR event = $2)
            ORDER BY received_at DESC, seq DESC
            LIMIT $3 OFFSET $4
            "
        ))
        .bind(&filter.source)
        .bind(&filter.event)
        .bind(i64::from(page.limit))
        .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await?;

        Ok(Page::new(data, u64::try_from(total).unwrap_or(0), page))
    }
}

impl RecordStore for PostgresStore {
    fn save(&self, record: WebhookRecord) -> StoreFuture<'_, WebhookRecord> {
        Box::pin(self.insert(record))
    }

    fn find_by_key(&self, key: String) -> StoreFuture<'_, Option<WebhookRecord>> {
        Box::pin(async move { self.select_by_key(&key).await })
    }

    fn find_by_id(&self, id: RecordId) -> StoreFuture<'_, Option<WebhookRecord>> {
        Box::pin(self.select_by_id(id))
    }

    fn list(
        &self,
        filter: RecordFilter,
        page: PageRequest,
    ) -> StoreFuture<'_, Page<WebhookRecord>> {
        Box::pin(async move { self.select_page(&filter, page).await })
    }

    fn health_check(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.pool).await?;
            Ok(())
        })
    }
}
