//! Responses produced by the limiter itself.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::time::Duration;

use crate::identity::AddressParseError;

/// Quota size header added to allowed responses.
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Remaining quota header added to allowed responses.
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// 429 with the configured message and a `Retry-After` in whole seconds.
pub fn too_many_requests(message: &str, retry_after: Duration) -> Response {
    let secs = retry_after
        .as_secs()
        .saturating_add(u64::from(retry_after.subsec_nanos() > 0));
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, HeaderValue::from(secs))],
        message.to_string(),
    )
        .into_response()
}

/// 500 carrying the extraction error text.
pub fn identity_failure(err: &AddressParseError) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}

/// Attach quota headers to a response from the inner service.
pub fn add_rate_limit_headers(headers: &mut HeaderMap, limit: u64, remaining: u64) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
}
