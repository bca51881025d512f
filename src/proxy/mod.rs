use crate::config::GuardedRouteConfig;
use crate::error::{GuardError, Result};
use crate::rate_limit::{rate_limit_middleware, RateLimiterSet};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, Method, Response},
    middleware,
    routing::any,
    Router,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Forwarding state for rate limited routes
#[derive(Clone)]
pub struct ForwardState {
    pub client: reqwest::Client,
    pub upstream: String,
}

impl ForwardState {
    /// Create a new forwarding state
    pub fn new(upstream: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GuardError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            upstream: upstream.trim_end_matches('/').to_string(),
        })
    }
}

/// Build the rate limited routes, each admitted through its named limiter
/// before being forwarded upstream.
pub fn guarded_routes(
    routes: &[GuardedRouteConfig],
    limiters: &RateLimiterSet,
    forward: ForwardState,
) -> Result<Router> {
    let mut router = Router::new();

    for route in routes {
        let limiter = limiters.get(&route.limiter).ok_or_else(|| {
            GuardError::Config(format!(
                "Route {} references unknown limiter: {}",
                route.path, route.limiter
            ))
        })?;

        info!(
            path = %route.path,
            limiter = %route.limiter,
            "Registering rate limited route"
        );

        let guarded = Router::new()
            .route(&route.path, any(forward_handler))
            .route_layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
            .with_state(forward.clone());

        router = router.merge(guarded);
    }

    Ok(router)
}

/// Forward an admitted request to the upstream application
pub async fn forward_handler(
    State(state): State<ForwardState>,
    req: Request,
) -> Result<Response<Body>> {
    let method = req.method().clone();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let headers = req.headers().clone();

    let body_bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|e| GuardError::Upstream(format!("Failed to read request body: {}", e)))?
        .to_bytes();

    let upstream_url = format!("{}{}", state.upstream, path_and_query);
    debug!(upstream_url = %upstream_url, "Forwarding to upstream");

    let response = send_request(&state.client, method, headers, body_bytes, &upstream_url).await;

    match &response {
        Ok(resp) => info!(status = %resp.status(), "Upstream request completed"),
        Err(e) => warn!(error = %e, "Upstream request failed"),
    }

    response
}

/// Send request to the upstream service
async fn send_request(
    client: &reqwest::Client,
    method: Method,
    headers: HeaderMap,
    body_bytes: Bytes,
    upstream_url: &str,
) -> Result<Response<Body>> {
    let mut upstream_req = client.request(method, upstream_url).body(body_bytes);

    for (name, value) in headers.iter() {
        if !is_hop_by_hop_header(name.as_str()) {
            upstream_req = upstream_req.header(name, value);
        }
    }

    let upstream_response = upstream_req.send().await.map_err(|e| {
        if e.is_timeout() {
            GuardError::Timeout(format!("Upstream request timed out: {}", e))
        } else {
            GuardError::Upstream(format!("Upstream request failed: {}", e))
        }
    })?;

    let status = upstream_response.status();
    let mut response_builder = Response::builder().status(status);

    for (name, value) in upstream_response.headers().iter() {
        if !is_hop_by_hop_header(name.as_str()) {
            response_builder = response_builder.header(name, value);
        }
    }

    let body_bytes = upstream_response
        .bytes()
        .await
        .map_err(|e| GuardError::Upstream(format!("Failed to read upstream response: {}", e)))?;

    response_builder
        .body(Body::from(body_bytes))
        .map_err(|e| GuardError::Internal(format!("Failed to build response: {}", e)))
}

/// Headers that describe this hop rather than the message
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}
