//! Request identifier propagation and error body rendering.

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    error::{ErrorBody, ErrorReport},
    AppState,
};

/// Header carrying the request identifier in both directions.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Identifier of the current request, available as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Assigns a request id, runs the request inside a span carrying it, and
/// renders any `ErrorReport` into the uniform error body.
///
/// A caller-supplied `X-Request-Id` is reused when it is printable and
/// reasonably short; otherwise a UUID v4 is generated.
pub async fn request_context(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
    let path = req.uri().path().to_string();

    req.extensions_mut().insert(RequestId(request_id.clone()));

    let span = info_span!("request", request_id = %request_id, method = %req.method(), path = %path);
    let mut response = next.run(req).instrument(span).await;

    if let Some(report) = response.extensions_mut().remove::<ErrorReport>() {
        match &report.detail {
            Some(detail) => {
                error!(request_id = %request_id, path = %path, detail = %detail, "Request failed with internal error");
            },
            None => {
                warn!(
                    request_id = %request_id,
                    path = %path,
                    status = report.status.as_u16(),
                    message = %report.message,
                    "Request rejected"
                );
            },
        }

        let status = report.status;
        let body = ErrorBody::new(report, &request_id, &path, state.clock.now());
        response = (status, Json(body)).into_response();
    }

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
