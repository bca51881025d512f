pub mod config;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod proxy;
pub mod rate_limit;
pub mod resource;

use crate::config::{GuardConfig, LogFormat, LoggingConfig};
use crate::error::{GuardError, Result};
use crate::identity::JwtVerifier;
use crate::metrics::{metrics_handler, MetricsService};
use crate::proxy::{guarded_routes, ForwardState};
use crate::rate_limit::RateLimiterSet;
use crate::resource::{resource_routes, InMemoryOwnership, OwnershipLookup, ResourceGuard, ResourceState};
use axum::{routing::get, Router as AxumRouter};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// The assembled service: HTTP routes plus the limiters they share
pub struct GuardApp {
    router: AxumRouter,
    limiters: RateLimiterSet,
}

impl GuardApp {
    /// Build every component from configuration
    pub fn build(config: &GuardConfig, ownership: Arc<dyn OwnershipLookup>) -> Result<Self> {
        config.validate()?;

        let limiters = RateLimiterSet::from_configs(&config.rate_limiting.limiters)?;
        let guard = ResourceGuard::new(&config.storage, ownership)?;
        let verifier = JwtVerifier::new(&config.auth)?;

        let mut router = resource_routes(ResourceState::new(guard, verifier));

        if !config.rate_limiting.routes.is_empty() {
            let upstream = config.upstream.as_ref().ok_or_else(|| {
                GuardError::Config("Rate limited routes require an upstream".to_string())
            })?;
            let forward = ForwardState::new(
                &upstream.url,
                Duration::from_secs(config.server.timeout_secs),
            )?;
            router = router.merge(guarded_routes(
                &config.rate_limiting.routes,
                &limiters,
                forward,
            )?);
        }

        info!(
            limiters = limiters.len(),
            guarded_routes = config.rate_limiting.routes.len(),
            "Application assembled"
        );

        Ok(Self { router, limiters })
    }

    /// Expose Prometheus metrics on `/metrics`
    pub fn with_metrics(mut self, metrics: MetricsService) -> Self {
        let metrics_routes = AxumRouter::new()
            .route("/metrics", get(metrics_handler))
            .with_state(metrics);
        self.router = self.router.merge(metrics_routes);
        self
    }

    pub fn limiters(&self) -> &RateLimiterSet {
        &self.limiters
    }

    /// Final router with request tracing
    pub fn into_router(self) -> AxumRouter {
        self.router.layer(TraceLayer::new_for_http())
    }
}

/// Run the service until Ctrl-C
pub async fn run(config: GuardConfig) -> Result<()> {
    info!("Starting campus guard");

    let ownership = Arc::new(InMemoryOwnership::from_map(&config.storage.owners));
    let app = GuardApp::build(&config, ownership)?.with_metrics(MetricsService::new()?);

    let limiters = app.limiters().clone();
    limiters.start_cleanup(Duration::from_secs(
        config.rate_limiting.cleanup_interval_secs,
    ));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(GuardError::Io)?;

    info!("Server listening on {}", addr);

    axum::serve(listener, app.into_router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GuardError::Internal(format!("Server error: {}", e)))?;

    limiters.destroy_all();
    info!("Campus guard stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize tracing/logging
pub fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}
