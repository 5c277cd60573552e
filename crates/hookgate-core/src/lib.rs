//! Core domain models, errors and persistence for webhook admission.
//!
//! Provides the strongly-typed record model, the clock abstraction used for
//! timestamps and cache expiry, and the `RecordStore` collaborator through
//! which accepted webhooks are persisted and retrieved.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{
    Page, PageMeta, PageRequest, RecordFilter, RecordId, RecordStatus, WebhookRecord,
};
pub use storage::{memory::InMemoryStore, postgres::PostgresStore, RecordStore};
pub use time::{Clock, SystemClock, TestClock};
