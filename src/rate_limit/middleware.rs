use super::client_ip::extract_client_ip;
use super::limiter::RateLimiter;
use super::types::RateLimitResult;
use crate::metrics;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";
pub const RETRY_AFTER_HEADER: &str = "retry-after";

/// Axum middleware admitting requests through one named limiter.
///
/// Mount with `axum::middleware::from_fn_with_state(limiter, rate_limit_middleware)`.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client_ip = extract_client_ip(request.headers());
    let result = limiter.check(&client_ip);

    if !result.allowed {
        warn!(
            limiter = %limiter.name(),
            client_ip = %client_ip,
            path = %request.uri().path(),
            "Request rejected by rate limiter"
        );
        metrics::record_rate_limited(limiter.name());
        return create_rate_limit_response(&result);
    }

    debug!(
        limiter = %limiter.name(),
        client_ip = %client_ip,
        remaining = result.remaining,
        "Rate limit check passed"
    );

    let response = next.run(request).await;
    add_rate_limit_headers(response, &result)
}

/// Create a 429 Too Many Requests response with rate limit headers
pub fn create_rate_limit_response(result: &RateLimitResult) -> Response {
    let mut headers = HeaderMap::new();
    insert_rate_limit_headers(&mut headers, result);
    headers.insert(
        RETRY_AFTER_HEADER,
        HeaderValue::from(result.retry_after_secs),
    );

    let body = serde_json::json!({
        "error": "Too many requests",
        "status": 429,
        "limit": result.limit,
        "remaining": 0,
        "reset_at": result.reset_at,
        "retry_after": result.retry_after_secs,
    });

    (StatusCode::TOO_MANY_REQUESTS, headers, body.to_string()).into_response()
}

/// Add rate limit headers to an admitted response
pub fn add_rate_limit_headers(mut response: Response, result: &RateLimitResult) -> Response {
    insert_rate_limit_headers(response.headers_mut(), result);
    response
}

fn insert_rate_limit_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(result.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(result.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(result.reset_at));
}
