//! Ingestion orchestration (IngestionService).
//!
//! Turns a validated request into exactly one persisted `WebhookRecord` per
//! idempotency key. The store's uniqueness constraint is the authority: when
//! two concurrent deliveries race past the lookup, the losing insert is
//! resolved by re-reading the winner.

use std::sync::Arc;

use hookgate_core::{
    Clock, CoreError, Page, PageRequest, RecordFilter, RecordId, RecordStore, Result,
    WebhookRecord,
};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

/// Body accepted by `POST /webhooks`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWebhookRequest {
    /// Originating system.
    #[validate(length(min = 1, max = 100, message = "must be between 1 and 100 characters"))]
    pub source: String,

    /// Event name.
    #[validate(length(min = 1, max = 100, message = "must be between 1 and 100 characters"))]
    pub event: String,

    /// Arbitrary JSON object.
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Outcome of `IngestionService::create`.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    /// The record now persisted for this delivery.
    pub record: WebhookRecord,
    /// False when an earlier delivery with the same key already produced it.
    pub is_new: bool,
}

/// Creates and reads webhook records through a `RecordStore`.
#[derive(Clone)]
pub struct IngestionService {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl IngestionService {
    /// Creates a service over the given store and clock.
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Accepts a delivery, returning the existing record when the
    /// idempotency key has been seen before.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails for any reason other than a
    /// duplicate idempotency key.
    #[instrument(
        name = "ingestion.create",
        skip(self, request, signature, idempotency_key),
        fields(source = %request.source, event = %request.event, idempotency_key = idempotency_key.as_deref().unwrap_or("none"))
    )]
    pub async fn create(
        &self,
        request: CreateWebhookRequest,
        signature: Option<String>,
        idempotency_key: Option<String>,
    ) -> Result<Ingested> {
        let idempotency_key = idempotency_key.filter(|k| !k.is_empty());

        if let Some(key) = &idempotency_key {
            if let Some(existing) = self.store.find_by_key(key.clone()).await? {
                info!(record_id = %existing.id, "Duplicate delivery, returning existing record");
                return Ok(Ingested { record: existing, is_new: false });
            }
        }

        let record = WebhookRecord::new(
            request.source,
            request.event,
            serde_json::Value::Object(request.payload),
            signature.filter(|s| !s.is_empty()),
            idempotency_key.clone(),
            self.clock.now(),
        );
        debug!(record_id = %record.id, "Persisting new record");

        match self.store.save(record).await {
            Ok(saved) => {
                info!(record_id = %saved.id, "Webhook record created");
                Ok(Ingested { record: saved, is_new: true })
            },
            Err(err) if err.is_conflict() => {
                let Some(key) = idempotency_key else { return Err(err) };
                warn!(error = %err, "Concurrent delivery won the insert, re-reading by key");
                let winner = self.store.find_by_key(key.clone()).await?.ok_or_else(|| {
                    CoreError::Database(format!(
                        "record for idempotency key {key} vanished after conflict"
                    ))
                })?;
                Ok(Ingested { record: winner, is_new: false })
            },
            Err(err) => Err(err),
        }
    }

    /// Fetches a record by id.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` when no record has this id.
    #[instrument(name = "ingestion.find_one", skip(self))]
    pub async fn find_one(&self, id: RecordId) -> Result<WebhookRecord> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Webhook with ID {id} not found")))
    }

    /// Lists records newest first.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    #[instrument(name = "ingestion.find_all", skip(self))]
    pub async fn find_all(
        &self,
        filter: RecordFilter,
        page: PageRequest,
    ) -> Result<Page<WebhookRecord>> {
        self.store.list(filter, page).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use hookgate_core::{storage::StoreFuture, InMemoryStore, RecordStatus, TestClock};
    use serde_json::json;

    use super::*;

    fn request(source: &str) -> CreateWebhookRequest {
        CreateWebhookRequest {
            source: source.to_string(),
            event: "payment.completed".to_string(),
            payload: json!({"orderId": "12345", "amount": 100})
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    fn service() -> (IngestionService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (IngestionService::new(store.clone(), Arc::new(TestClock::new())), store)
    }

    #[tokio::test]
    async fn create_persists_pending_record() {
        let (service, store) = service();

        let ingested =
            service.create(request("stripe"), Some("abc".into()), None).await.unwrap();

        assert!(ingested.is_new);
        assert_eq!(ingested.record.source, "stripe");
        assert_eq!(ingested.record.status, RecordStatus::Pending);
        assert_eq!(ingested.record.signature.as_deref(), Some("abc"));
        assert_eq!(ingested.record.idempotency_key, None);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn same_key_returns_first_record() {
        let (service, store) = service();

        let first = service.create(request("stripe"), None, Some("k1".into())).await.unwrap();
        let second = service.create(request("github"), None, Some("k1".into())).await.unwrap();

        assert!(first.is_new);
        assert!(!second.is_new);
        assert_eq!(first.record.id, second.record.id);
        assert_eq!(second.record.source, "stripe");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn without_key_every_call_is_distinct() {
        let (service, store) = service();

        let a = service.create(request("stripe"), None, None).await.unwrap();
        let b = service.create(request("stripe"), None, Some(String::new())).await.unwrap();

        assert_ne!(a.record.id, b.record.id);
        assert_eq!(store.len().await, 2);
    }

    /// Store whose first key lookup misses, as if a concurrent request had
    /// not yet committed.
    struct RacingStore {
        inner: InMemoryStore,
        missed: AtomicBool,
    }

    impl RecordStore for RacingStore {
        fn save(&self, record: WebhookRecord) -> StoreFuture<'_, WebhookRecord> {
            self.inner.save(record)
        }

        fn find_by_key(&self, key: String) -> StoreFuture<'_, Option<WebhookRecord>> {
            if self.missed.swap(true, Ordering::SeqCst) {
                self.inner.find_by_key(key)
            } else {
                Box::pin(async { Ok(None) })
            }
        }

        fn find_by_id(&self, id: RecordId) -> StoreFuture<'_, Option<WebhookRecord>> {
            self.inner.find_by_id(id)
        }

        fn list(
            &self,
            filter: RecordFilter,
            page: PageRequest,
        ) -> StoreFuture<'_, Page<WebhookRecord>> {
            self.inner.list(filter, page)
        }

        fn health_check(&self) -> StoreFuture<'_, ()> {
            self.inner.health_check()
        }
    }

    #[tokio::test]
    async fn insert_conflict_resolves_to_existing_record() {
        let clock = TestClock::new();
        let inner = InMemoryStore::new();
        let winner = inner
            .save(WebhookRecord::new(
                "stripe",
                "payment.completed",
                json!({}),
                None,
                Some("k1".into()),
                clock.now(),
            ))
            .await
            .unwrap();

        let store = Arc::new(RacingStore { inner, missed: AtomicBool::new(false) });
        let service = IngestionService::new(store.clone(), Arc::new(clock));

        let ingested = service.create(request("github"), None, Some("k1".into())).await.unwrap();

        assert!(!ingested.is_new);
        assert_eq!(ingested.record.id, winner.id);
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_duplicates_persist_one_record() {
        let (service, store) = service();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service.create(request("stripe"), None, Some("race".into())).await
                })
            })
            .collect();

        let mut ids = Vec::new();
        let mut created = 0;
        for handle in handles {
            let ingested = handle.await.unwrap().unwrap();
            if ingested.is_new {
                created += 1;
            }
            ids.push(ingested.record.id);
        }

        assert_eq!(created, 1);
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn find_one_reports_missing_record() {
        let (service, _) = service();
        let id = RecordId::new();

        let err = service.find_one(id).await.unwrap_err();

        assert!(matches!(err, CoreError::NotFound(ref msg) if *msg == format!("Webhook with ID {id} not found")));
    }

    #[tokio::test]
    async fn find_all_pages_newest_first() {
        let store = Arc::new(InMemoryStore::new());
        let clock = TestClock::new();
        let service = IngestionService::new(store.clone(), Arc::new(clock.clone()));

        for i in 0..25 {
            service.create(request(&format!("src-{i}")), None, None).await.unwrap();
            clock.advance(chrono::Duration::seconds(1));
        }

        let page = service.find_all(RecordFilter::default(), PageRequest::new(3, 10)).await.unwrap();

        assert_eq!(page.meta.total, 25);
        assert_eq!(page.meta.total_pages, 3);
        let sources: Vec<_> = page.data.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, ["src-4", "src-3", "src-2", "src-1", "src-0"]);
    }

    #[test]
    fn request_validation_rejects_empty_and_long_fields() {
        let mut req = request("");
        req.event = "e".repeat(101);

        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();

        assert!(fields.contains_key("source"));
        assert!(fields.contains_key("event"));
        assert!(request("stripe").validate().is_ok());
    }
}
