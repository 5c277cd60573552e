//! Integration tests for the PostgreSQL record store.
//!
//! Each test runs in its own freshly created database on the server named by
//! `DATABASE_URL`, and is skipped when that variable is not set.

use std::{str::FromStr, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use hookgate_core::{PageRequest, PostgresStore, RecordFilter, RecordStore, WebhookRecord};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use uuid::Uuid;

/// Isolated database dropped by [`TestDatabase::cleanup`].
struct TestDatabase {
    admin: PgPool,
    name: String,
    store: PostgresStore,
}

impl TestDatabase {
    /// Creates a uniquely named database with the schema applied, or `None`
    /// when no server is configured.
    async fn new() -> Result<Option<Self>> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping PostgreSQL store test");
            return Ok(None);
        };

        let options = PgConnectOptions::from_str(&url).context("invalid DATABASE_URL")?;
        let admin = PgPoolOptions::new()
            .max_connections(2)
            .connect_with(options.clone())
            .await
            .context("Failed to connect to PostgreSQL admin database")?;

        let name = format!("hookgate_test_{}", Uuid::new_v4().simple());
        sqlx::query(&format!("CREATE DATABASE \"{name}\""))
            .execute(&admin)
            .await
            .context("Failed to create test database")?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(options.database(&name))
            .await
            .context("Failed to connect to test database")?;

        let store = PostgresStore::new(pool);
        store.ensure_schema().await?;

        Ok(Some(Self { admin, name, store }))
    }

    async fn cleanup(self) -> Result<()> {
        self.store.pool().close().await;
        sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\"", self.name))
            .execute(&self.admin)
            .await
            .context("Failed to drop test database")?;
        self.admin.close().await;
        Ok(())
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default()
}

fn record(source: &str, event: &str, key: Option<&str>, received_at: DateTime<Utc>) -> WebhookRecord {
    WebhookRecord::new(
        source,
        event,
        serde_json::json!({"amount": 100}),
        Some("abc123".into()),
        key.map(str::to_string),
        received_at,
    )
}

async fn count(store: &PostgresStore, filter: RecordFilter) -> Result<u64> {
    Ok(store.list(filter, PageRequest::default()).await?.meta.total)
}

#[tokio::test]
async fn schema_setup_is_repeatable_and_healthy() -> Result<()> {
    let Some(db) = TestDatabase::new().await? else { return Ok(()) };

    db.store.ensure_schema().await?;
    db.store.health_check().await?;

    db.cleanup().await
}

#[tokio::test]
async fn save_then_find_by_id_and_key() -> Result<()> {
    let Some(db) = TestDatabase::new().await? else { return Ok(()) };

    let saved = db.store.save(record("stripe", "payment.completed", Some("k1"), base_time())).await?;

    let by_id = db.store.find_by_id(saved.id).await?;
    let by_key = db.store.find_by_key("k1".into()).await?;

    assert_eq!(by_id.as_ref(), Some(&saved));
    assert_eq!(by_key.as_ref(), Some(&saved));
    assert_eq!(saved.payload["amount"], 100);
    assert!(db.store.find_by_key("k2".into()).await?.is_none());

    db.cleanup().await
}

#[tokio::test]
async fn duplicate_key_is_rejected_without_write() -> Result<()> {
    let Some(db) = TestDatabase::new().await? else { return Ok(()) };

    let first = db.store.save(record("stripe", "payment.completed", Some("k1"), base_time())).await?;
    let err = db
        .store
        .save(record("github", "push", Some("k1"), base_time()))
        .await
        .expect_err("second insert with the same key must fail");

    assert!(err.is_conflict());
    assert_eq!(count(&db.store, RecordFilter::default()).await?, 1);

    // The surviving row is the first writer's.
    let winner = db.store.find_by_key("k1".into()).await?;
    assert_eq!(winner.map(|r| r.id), Some(first.id));

    db.cleanup().await
}

#[tokio::test]
async fn records_without_key_never_conflict() -> Result<()> {
    let Some(db) = TestDatabase::new().await? else { return Ok(()) };

    db.store.save(record("stripe", "payment.completed", None, base_time())).await?;
    db.store.save(record("stripe", "payment.completed", None, base_time())).await?;

    assert_eq!(count(&db.store, RecordFilter::default()).await?, 2);

    db.cleanup().await
}

#[tokio::test]
async fn concurrent_saves_with_same_key_store_one_record() -> Result<()> {
    let Some(db) = TestDatabase::new().await? else { return Ok(()) };
    let store = Arc::new(db.store.clone());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store.save(record("stripe", "payment.completed", Some("race"), base_time())).await
            })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => successes += 1,
            Err(err) => assert!(err.is_conflict(), "unexpected error: {err}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(count(&db.store, RecordFilter::default()).await?, 1);

    db.cleanup().await
}

#[tokio::test]
async fn list_pages_newest_first() -> Result<()> {
    let Some(db) = TestDatabase::new().await? else { return Ok(()) };

    for i in 0..25 {
        let received_at = base_time() + Duration::seconds(i);
        db.store.save(record("stripe", &format!("event-{i}"), None, received_at)).await?;
    }

    let page = db.store.list(RecordFilter::default(), PageRequest::new(3, 10)).await?;

    let events: Vec<_> = page.data.iter().map(|r| r.event.as_str()).collect();
    assert_eq!(events, ["event-4", "event-3", "event-2", "event-1", "event-0"]);
    assert_eq!(page.meta.total, 25);
    assert_eq!(page.meta.total_pages, 3);

    let past_end = db.store.list(RecordFilter::default(), PageRequest::new(4, 10)).await?;
    assert!(past_end.data.is_empty());
    assert_eq!(past_end.meta.total, 25);

    db.cleanup().await
}

#[tokio::test]
async fn equal_timestamps_list_in_reverse_insertion_order() -> Result<()> {
    let Some(db) = TestDatabase::new().await? else { return Ok(()) };

    for i in 0..6 {
        db.store.save(record("stripe", &format!("event-{i}"), None, base_time())).await?;
    }

    let first = db.store.list(RecordFilter::default(), PageRequest::new(1, 3)).await?;
    let second = db.store.list(RecordFilter::default(), PageRequest::new(2, 3)).await?;

    let events: Vec<_> =
        first.data.iter().chain(second.data.iter()).map(|r| r.event.clone()).collect();
    assert_eq!(events, ["event-5", "event-4", "event-3", "event-2", "event-1", "event-0"]);

    db.cleanup().await
}

#[tokio::test]
async fn filters_count_matching_records() -> Result<()> {
    let Some(db) = TestDatabase::new().await? else { return Ok(()) };

    let fixtures = [
        ("stripe", "payment.completed"),
        ("stripe", "payment.completed"),
        ("stripe", "payment.failed"),
        ("github", "push"),
        ("github", "payment.completed"),
    ];
    for (i, (source, event)) in fixtures.into_iter().enumerate() {
        let received_at = base_time() + Duration::seconds(i64::try_from(i)?);
        db.store.save(record(source, event, None, received_at)).await?;
    }

    let by_source = RecordFilter { source: Some("stripe".into()), event: None };
    let by_event = RecordFilter { source: None, event: Some("payment.completed".into()) };
    let by_both =
        RecordFilter { source: Some("github".into()), event: Some("payment.completed".into()) };
    let no_match = RecordFilter { source: Some("shopify".into()), event: None };

    assert_eq!(count(&db.store, RecordFilter::default()).await?, 5);
    assert_eq!(count(&db.store, by_source).await?, 3);
    assert_eq!(count(&db.store, by_event).await?, 3);
    assert_eq!(count(&db.store, by_both.clone()).await?, 1);
    assert_eq!(count(&db.store, no_match).await?, 0);

    let page = db.store.list(by_both, PageRequest::default()).await?;
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].source, "github");

    db.cleanup().await
}
