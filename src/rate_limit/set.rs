use super::clock::{Clock, SystemClock};
use super::limiter::RateLimiter;
use super::types::LimiterConfig;
use crate::error::{GuardError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The named limiters of one process, built once at startup and handed to
/// the routes that need them.
#[derive(Debug, Clone, Default)]
pub struct RateLimiterSet {
    limiters: HashMap<String, Arc<RateLimiter>>,
}

impl RateLimiterSet {
    /// Build one limiter per configuration, rejecting duplicate names
    pub fn from_configs(configs: &[LimiterConfig]) -> Result<Self> {
        Self::with_clock(configs, Arc::new(SystemClock))
    }

    pub fn with_clock(configs: &[LimiterConfig], clock: Arc<dyn Clock>) -> Result<Self> {
        let mut limiters = HashMap::with_capacity(configs.len());

        for config in configs {
            if limiters.contains_key(&config.name) {
                return Err(GuardError::Config(format!(
                    "Duplicate rate limiter name: {}",
                    config.name
                )));
            }

            let limiter = RateLimiter::with_clock(config.clone(), clock.clone())?;
            limiters.insert(config.name.clone(), Arc::new(limiter));
        }

        Ok(Self { limiters })
    }

    pub fn get(&self, name: &str) -> Option<Arc<RateLimiter>> {
        self.limiters.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.limiters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    /// Start the periodic sweep on every limiter
    pub fn start_cleanup(&self, every: Duration) {
        info!(
            limiters = self.limiters.len(),
            interval_secs = every.as_secs(),
            "Starting rate limiter cleanup"
        );
        for limiter in self.limiters.values() {
            limiter.start_cleanup(every);
        }
    }

    /// Tear down every limiter (process shutdown)
    pub fn destroy_all(&self) {
        for limiter in self.limiters.values() {
            limiter.destroy();
        }
    }
}
