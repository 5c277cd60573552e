//! Request builders for driving the webhook API in tests.

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request},
};
use hookgate_api::{
    middleware::{
        auth::API_KEY_HEADER, idempotency::IDEMPOTENCY_KEY_HEADER,
        request_context::REQUEST_ID_HEADER, signature::SIGNATURE_HEADER,
    },
    SignatureVerifier,
};
use serde_json::{json, Value};

use crate::{TEST_API_KEY, TEST_SECRET};

/// Body used by most ingestion tests.
pub fn stripe_payment() -> Value {
    json!({
        "source": "stripe",
        "event": "payment.completed",
        "payload": {"orderId": "12345", "amount": 100}
    })
}

/// How the signature header is populated.
#[derive(Debug, Clone)]
enum Signing {
    /// Signed over the exact body sent.
    Body,
    /// Signed over some other body.
    Other(Vec<u8>),
    /// Literal header value.
    Literal(String),
    /// No header.
    Absent,
}

/// Builder for requests against the API.
///
/// Defaults to an authenticated request with a valid signature over the
/// exact body bytes.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    uri: String,
    body: Vec<u8>,
    api_key: Option<String>,
    signing: Signing,
    idempotency_key: Option<String>,
    request_id: Option<String>,
    secret: String,
}

impl RequestBuilder {
    /// Starts a request with the given method and URI.
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            body: Vec::new(),
            api_key: Some(TEST_API_KEY.to_string()),
            signing: Signing::Body,
            idempotency_key: None,
            request_id: None,
            secret: TEST_SECRET.to_string(),
        }
    }

    /// `POST /webhooks` with the given JSON body.
    pub fn post_webhook(body: &Value) -> Self {
        Self::new(Method::POST, "/webhooks").json(body)
    }

    /// `GET` of the given URI.
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    /// Serialises `value` compactly as the body.
    #[must_use]
    pub fn json(mut self, value: &Value) -> Self {
        self.body = value.to_string().into_bytes();
        self
    }

    /// Uses these exact bytes as the body.
    #[must_use]
    pub fn raw_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sends this API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Omits the API key header.
    #[must_use]
    pub fn without_api_key(mut self) -> Self {
        self.api_key = None;
        self
    }

    /// Omits the signature header.
    #[must_use]
    pub fn unsigned(mut self) -> Self {
        self.signing = Signing::Absent;
        self
    }

    /// Signs a different body than the one sent.
    #[must_use]
    pub fn signed_over(mut self, other: impl Into<Vec<u8>>) -> Self {
        self.signing = Signing::Other(other.into());
        self
    }

    /// Sends a literal signature header.
    #[must_use]
    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signing = Signing::Literal(signature.into());
        self
    }

    /// Signs with another secret.
    #[must_use]
    pub fn signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    /// Sends `X-Idempotency-Key`.
    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Sends `X-Request-Id`.
    #[must_use]
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Builds the request.
    ///
    /// # Panics
    ///
    /// Panics if a header value is not valid.
    pub fn build(self) -> Request<Body> {
        let verifier = SignatureVerifier::new(self.secret);
        let signature = match self.signing {
            Signing::Body => Some(verifier.generate(&self.body)),
            Signing::Other(other) => Some(verifier.generate(&other)),
            Signing::Literal(value) => Some(value),
            Signing::Absent => None,
        };

        let mut builder = Request::builder().method(self.method).uri(self.uri);
        if !self.body.is_empty() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        if let Some(key) = self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        if let Some(key) = self.idempotency_key {
            builder = builder.header(IDEMPOTENCY_KEY_HEADER, key);
        }
        if let Some(id) = self.request_id {
            builder = builder.header(REQUEST_ID_HEADER, id);
        }

        builder.body(Body::from(self.body)).expect("valid test request")
    }
}
