//! In-process record store.
//!
//! Used when no database is configured and by the test harness. Uniqueness of
//! idempotency keys is checked and recorded under the same write lock as the
//! insert, so concurrent duplicates resolve to exactly one stored record.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use super::{RecordStore, StoreFuture};
use crate::{
    error::CoreError,
    models::{Page, PageRequest, RecordFilter, RecordId, WebhookRecord},
};

#[derive(Default)]
struct Inner {
    records: HashMap<RecordId, Stored>,
    keys: HashMap<String, RecordId>,
    next_seq: u64,
}

struct Stored {
    record: WebhookRecord,
    seq: u64,
}

/// Record store held entirely in memory.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Returns true when nothing has been stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl RecordStore for InMemoryStore {
    fn save(&self, record: WebhookRecord) -> StoreFuture<'_, WebhookRecord> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;

            if let Some(key) = &record.idempotency_key {
                if inner.keys.contains_key(key) {
                    return Err(CoreError::ConstraintViolation(format!(
                        "idempotency key already recorded: {key}"
                    )));
                }
            }
            if inner.records.contains_key(&record.id) {
                return Err(CoreError::ConstraintViolation(format!(
                    "record id already exists: {}",
                    record.id
                )));
            }

            if let Some(key) = &record.idempotency_key {
                inner.keys.insert(key.clone(), record.id);
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.records.insert(record.id, Stored { record: record.clone(), seq });

            debug!(record_id = %record.id, "record stored in memory");
            Ok(record)
        })
    }

    fn find_by_key(&self, key: String) -> StoreFuture<'_, Option<WebhookRecord>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            Ok(inner
                .keys
                .get(&key)
                .and_then(|id| inner.records.get(id))
                .map(|stored| stored.record.clone()))
        })
    }

    fn find_by_id(&self, id: RecordId) -> StoreFuture<'_, Option<WebhookRecord>> {
        Box::pin(async move {
            Ok(self.inner.read().await.records.get(&id).map(|stored| stored.record.clone()))
        })
    }

    fn list(
        &self,
        filter: RecordFilter,
        page: PageRequest,
    ) -> StoreFuture<'_, Page<WebhookRecord>> {
        Box::pin(async move {
            let inner = self.inner.read().await;

            let mut matching: Vec<&Stored> =
                inner.records.values().filter(|stored| filter.matches(&stored.record)).collect();
            matching.sort_by(|a, b| {
                b.record.received_at.cmp(&a.record.received_at).then(b.seq.cmp(&a.seq))
            });

            let total = matching.len() as u64;
            let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
            let data = matching
                .into_iter()
                .skip(offset)
                .take(page.limit as usize)
                .map(|stored| stored.record.clone())
                .collect();

            Ok(Page::new(data, total, page))
        })
    }

    fn health_check(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}
