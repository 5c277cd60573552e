//! Declarative per-route admission policy.
//!
//! Each route template is registered once with the checks it requires. The
//! gates look the policy up by method and matched path at dispatch time;
//! routes that were never registered get the strictest policy.

use std::collections::HashMap;

use axum::{
    extract::{MatchedPath, Request},
    http::Method,
};

/// Checks a route requires before reaching its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicy {
    /// Whether the API key must be presented.
    pub requires_auth: bool,
    /// Whether mutating requests must carry a valid signature.
    pub requires_signature: bool,
}

impl RoutePolicy {
    /// API key and signature both required.
    pub const fn protected() -> Self {
        Self { requires_auth: true, requires_signature: true }
    }

    /// API key required, signature check skipped.
    pub const fn authenticated() -> Self {
        Self { requires_auth: true, requires_signature: false }
    }

    /// No checks at all.
    pub const fn public() -> Self {
        Self { requires_auth: false, requires_signature: false }
    }
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::protected()
    }
}

/// Lookup table from `(method, route template)` to policy.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    policies: HashMap<(Method, String), RoutePolicy>,
}

impl RouteTable {
    /// Creates an empty table. Every lookup yields the default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the policy for a route template such as `/webhooks/{id}`.
    #[must_use]
    pub fn route(mut self, method: Method, path: impl Into<String>, policy: RoutePolicy) -> Self {
        self.policies.insert((method, path.into()), policy);
        self
    }

    /// Returns the policy for a matched route.
    pub fn policy_for(&self, method: &Method, path: &str) -> RoutePolicy {
        self.policies.get(&(method.clone(), path.to_string())).copied().unwrap_or_default()
    }

    /// The table used by the service router.
    pub fn standard() -> Self {
        Self::new()
            .route(Method::POST, "/webhooks", RoutePolicy::protected())
            .route(Method::GET, "/webhooks", RoutePolicy::authenticated())
            .route(Method::GET, "/webhooks/{id}", RoutePolicy::authenticated())
            .route(Method::GET, "/health", RoutePolicy::public())
    }
}

/// Resolves the policy for a request that has already been routed.
///
/// Without a matched path (e.g. the fallback handler) the default policy
/// applies.
pub(crate) fn policy_for_request(table: &RouteTable, req: &Request) -> RoutePolicy {
    req.extensions()
        .get::<MatchedPath>()
        .map_or_else(RoutePolicy::default, |path| table.policy_for(req.method(), path.as_str()))
}
