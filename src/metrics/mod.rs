use crate::error::{GuardError, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the global Prometheus recorder. Call once per process.
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            GuardError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    fn register_metrics() {
        describe_counter!(
            "guard_rate_limit_exceeded_total",
            "Total number of requests rejected due to rate limiting"
        );
        describe_counter!(
            "guard_resource_served_total",
            "Total number of private files served"
        );
        describe_counter!(
            "guard_resource_rejected_total",
            "Total number of private file requests rejected, by reason"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        service.render(),
    )
}

/// Record a request rejected by a named limiter
pub fn record_rate_limited(limiter: &str) {
    counter!("guard_rate_limit_exceeded_total", "limiter" => limiter.to_string()).increment(1);
}

/// Record a private file served
pub fn record_resource_served(content_type: &'static str) {
    counter!("guard_resource_served_total", "content_type" => content_type).increment(1);
}

/// Record a private file request refused by the guard
pub fn record_resource_rejected(reason: &'static str) {
    counter!("guard_resource_rejected_total", "reason" => reason).increment(1);
}

/// Metric label for a guard failure
pub fn rejection_label(err: &GuardError) -> &'static str {
    match err {
        GuardError::Unauthenticated | GuardError::InvalidToken(_) => "unauthenticated",
        GuardError::Forbidden(reason) => reason.as_str(),
        GuardError::NotFound => "not_found",
        _ => "internal",
    }
}
