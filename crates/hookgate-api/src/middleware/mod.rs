//! HTTP middleware forming the admission pipeline.
//!
//! Per request, stages run strictly in this order and a later stage never
//! runs once an earlier one denies:
//! 1. `auth` - API key check (CredentialGate)
//! 2. `signature` - HMAC body signature check (SignatureGate)
//! 3. `idempotency` - replay of previously produced responses
//!
//! `request_context` wraps all of them and renders error bodies.

pub mod auth;
pub mod idempotency;
pub mod request_context;
pub mod signature;
