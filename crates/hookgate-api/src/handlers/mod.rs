//! HTTP request handlers.
//!
//! Handlers run after the admission gates and only see requests that were
//! admitted. They return `ApiError` on failure and leave body rendering to
//! the request-context middleware.
//!
//! - `webhooks` - ingestion, listing and lookup of webhook records
//! - `health` - storage connectivity probe

pub mod health;
pub mod webhooks;

pub use health::health_check;
pub use webhooks::{create_webhook, get_webhook, list_webhooks, not_found};
