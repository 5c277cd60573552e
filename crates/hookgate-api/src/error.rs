//! API error taxonomy and the uniform error body.
//!
//! Handlers and gates return `ApiError`. Turning one into a response only
//! attaches an `ErrorReport` to the response extensions; the request-context
//! middleware, which knows the request id and path, renders the final body:
//!
//! ```json
//! {"statusCode":403,"message":"Invalid webhook signature","requestId":"...","timestamp":"...","path":"/webhooks"}
//! ```

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use hookgate_core::CoreError;
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::gate::DenialReason;

/// Errors surfaced to HTTP callers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid API key.
    #[error("{0}")]
    Authentication(DenialReason),

    /// Missing or invalid webhook signature.
    #[error("{0}")]
    Authorization(DenialReason),

    /// Request body or query failed validation.
    #[error("Validation failed")]
    Validation(Vec<String>),

    /// Malformed request outside field validation.
    #[error("{0}")]
    BadRequest(String),

    /// Request body exceeded the buffering limit.
    #[error("Payload too large")]
    PayloadTooLarge,

    /// Unknown resource.
    #[error("{0}")]
    NotFound(String),

    /// Unexpected fault. The detail is logged, never returned.
    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    /// Maps a gate denial to the matching error.
    pub fn denied(reason: DenialReason) -> Self {
        if reason.is_authentication() {
            Self::Authentication(reason)
        } else {
            Self::Authorization(reason)
        }
    }

    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(what) => Self::NotFound(what),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    let msg: &str = error.message.as_deref().unwrap_or(&error.code);
                    format!("{field}: {msg}")
                })
            })
            .collect();
        messages.sort();
        Self::Validation(messages)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge;
        }
        Self::Validation(vec![rejection.body_text()])
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(vec![rejection.body_text()])
    }
}

/// Error details carried in response extensions until rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Response status.
    pub status: StatusCode,
    /// Caller-facing message.
    pub message: String,
    /// Field-level messages for validation failures.
    pub errors: Option<Vec<String>>,
    /// Internal detail, logged only.
    pub detail: Option<String>,
}

impl From<ApiError> for ErrorReport {
    fn from(err: ApiError) -> Self {
        let status = err.status();
        let message = err.to_string();
        match err {
            ApiError::Validation(errors) => Self { status, message, errors: Some(errors), detail: None },
            ApiError::Internal(detail) => Self { status, message, errors: None, detail: Some(detail) },
            _ => Self { status, message, errors: None, detail: None },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = ErrorReport::from(self);
        let mut response = report.status.into_response();
        response.extensions_mut().insert(report);
        response
    }
}

/// Uniform JSON error body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// HTTP status code.
    pub status_code: u16,
    /// Caller-facing message.
    pub message: String,
    /// Field-level messages, present for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    /// Request identifier, also sent as `X-Request-Id`.
    pub request_id: String,
    /// When the error was produced.
    pub timestamp: DateTime<Utc>,
    /// Request path.
    pub path: String,
}

impl ErrorBody {
    /// Builds the body for a report.
    pub fn new(report: ErrorReport, request_id: &str, path: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            status_code: report.status.as_u16(),
            message: report.message,
            errors: report.errors,
            request_id: request_id.to_string(),
            timestamp,
            path: path.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denials_map_to_status_codes() {
        assert_eq!(
            ApiError::denied(DenialReason::CredentialRequired).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::denied(DenialReason::InvalidCredential).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::denied(DenialReason::SignatureRequired).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::denied(DenialReason::InvalidSignature).status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn internal_detail_is_not_the_message() {
        let report = ErrorReport::from(ApiError::Internal("connection reset".into()));

        assert_eq!(report.message, "Internal server error");
        assert_eq!(report.detail.as_deref(), Some("connection reset"));
    }

    #[test]
    fn core_not_found_keeps_its_message() {
        let err = ApiError::from(CoreError::NotFound("Webhook with ID x not found".into()));

        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Webhook with ID x not found");
    }

    #[test]
    fn core_conflict_is_internal() {
        let err = ApiError::from(CoreError::ConstraintViolation("dup".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn into_response_attaches_report() {
        let response = ApiError::Validation(vec!["source: too long".into()]).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert_eq!(report.errors.as_deref(), Some(&["source: too long".to_string()][..]));
    }
}
