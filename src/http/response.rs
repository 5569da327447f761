//! Response helpers.
//!
//! # Responsibilities
//! - Plain-text `503 Service Unavailable` for exhaustion and forward failures
//! - The `lb-from` diagnostics header
//!
//! # Design Decisions
//! - Backend responses are otherwise relayed untouched
//! - Error bodies are short, fixed strings; details only go to the log

use axum::http::header::{HeaderName, HeaderValue, InvalidHeaderValue};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

/// Header naming the backend that served a response.
pub const LB_FROM: HeaderName = HeaderName::from_static("lb-from");

/// Body sent when a forward attempt fails.
pub const FORWARD_FAILED_BODY: &str = "Service Unavailable";

/// `503 Service Unavailable` with a plain-text body.
pub fn service_unavailable(message: impl Into<String>) -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, message.into()).into_response()
}

/// Set `lb-from: <backend>` on a response.
pub fn set_lb_from(headers: &mut HeaderMap, backend: &str) -> Result<(), InvalidHeaderValue> {
    headers.insert(LB_FROM, HeaderValue::from_str(backend)?);
    Ok(())
}
