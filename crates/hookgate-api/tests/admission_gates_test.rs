//! Credential and signature gates driven through the full router.

use axum::http::StatusCode;
use hookgate_testing::{stripe_payment, RequestBuilder, TestEnv};
use serde_json::json;

#[tokio::test]
async fn valid_request_is_accepted() {
    let env = TestEnv::new();

    let response = env.call(RequestBuilder::post_webhook(&stripe_payment())).await.unwrap();

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.message(), Some("Webhook received"));
    let id = uuid::Uuid::parse_str(response.id().unwrap()).unwrap();
    assert_eq!(id.get_version_num(), 4);
    assert_eq!(env.record_count().await, 1);
}

#[tokio::test]
async fn missing_api_key_is_rejected() {
    let env = TestEnv::new();

    let response =
        env.call(RequestBuilder::post_webhook(&stripe_payment()).without_api_key()).await.unwrap();

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.message(), Some("API key is required"));
    assert_eq!(env.record_count().await, 0);
}

#[tokio::test]
async fn empty_api_key_counts_as_missing() {
    let env = TestEnv::new();

    let response =
        env.call(RequestBuilder::post_webhook(&stripe_payment()).api_key("")).await.unwrap();

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.message(), Some("API key is required"));
}

#[tokio::test]
async fn wrong_api_key_is_rejected() {
    let env = TestEnv::new();

    let response =
        env.call(RequestBuilder::post_webhook(&stripe_payment()).api_key("nope")).await.unwrap();

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.message(), Some("Invalid API key"));
}

#[tokio::test]
async fn credential_gate_runs_before_signature_gate() {
    let env = TestEnv::new();

    let response = env
        .call(RequestBuilder::post_webhook(&stripe_payment()).without_api_key().unsigned())
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reads_require_api_key() {
    let env = TestEnv::new();

    let response = env.call(RequestBuilder::get("/webhooks").without_api_key()).await.unwrap();

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.message(), Some("API key is required"));
}

#[tokio::test]
async fn health_is_public() {
    let env = TestEnv::new();

    let response =
        env.call(RequestBuilder::get("/health").without_api_key().unsigned()).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let env = TestEnv::new();

    let response =
        env.call(RequestBuilder::post_webhook(&stripe_payment()).unsigned()).await.unwrap();

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.message(), Some("Webhook signature is required"));
    assert_eq!(env.record_count().await, 0);
}

#[tokio::test]
async fn signature_over_different_body_is_rejected() {
    let env = TestEnv::new();
    let other = json!({"source": "github", "event": "push", "payload": {}}).to_string();

    let response = env
        .call(RequestBuilder::post_webhook(&stripe_payment()).signed_over(other))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.message(), Some("Invalid webhook signature"));
    assert_eq!(env.record_count().await, 0);
}

#[tokio::test]
async fn signature_with_wrong_secret_is_rejected() {
    let env = TestEnv::new();

    let response = env
        .call(RequestBuilder::post_webhook(&stripe_payment()).signing_secret("other-secret"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.message(), Some("Invalid webhook signature"));
}

#[tokio::test]
async fn malformed_signatures_are_rejected() {
    let env = TestEnv::new();

    for signature in ["zz-not-hex", "abcd", "0"] {
        let response = env
            .call(RequestBuilder::post_webhook(&stripe_payment()).signature(signature))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::FORBIDDEN, "signature {signature:?}");
        assert_eq!(response.message(), Some("Invalid webhook signature"));
    }
}

#[tokio::test]
async fn signature_covers_raw_bytes_as_sent() {
    let env = TestEnv::new();
    // Key order and whitespace a re-serialisation would not reproduce.
    let body = "{ \"payload\": {\"amount\": 100, \"orderId\": \"12345\"},\n  \"event\": \"payment.completed\", \"source\": \"stripe\" }";

    let response = env
        .call(RequestBuilder::new(axum::http::Method::POST, "/webhooks").raw_body(body))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn uppercase_hex_signature_is_accepted() {
    let env = TestEnv::new();
    let body = stripe_payment().to_string();
    let signature = env.sign(body.as_bytes()).to_uppercase();

    let response = env
        .call(
            RequestBuilder::new(axum::http::Method::POST, "/webhooks")
                .raw_body(body)
                .signature(signature),
        )
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn reads_do_not_need_signature() {
    let env = TestEnv::new();

    let response = env.call(RequestBuilder::get("/webhooks").unsigned()).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
}

fn payment_with_blob(blob_len: usize) -> serde_json::Value {
    json!({
        "source": "stripe",
        "event": "payment.completed",
        "payload": {"orderId": "12345", "blob": "x".repeat(blob_len)}
    })
}

#[tokio::test]
async fn signed_body_above_extractor_default_is_accepted() {
    let env = TestEnv::new();

    let response =
        env.call(RequestBuilder::post_webhook(&payment_with_blob(3 * 1024 * 1024))).await.unwrap();

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.message(), Some("Webhook received"));
    assert_eq!(env.record_count().await, 1);
}

#[tokio::test]
async fn body_over_signed_limit_is_rejected_as_too_large() {
    let env = TestEnv::new();

    let response =
        env.call(RequestBuilder::post_webhook(&payment_with_blob(11 * 1024 * 1024))).await.unwrap();

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.body["statusCode"], 413);
    assert_eq!(response.message(), Some("Payload too large"));
    assert_eq!(env.record_count().await, 0);
}
