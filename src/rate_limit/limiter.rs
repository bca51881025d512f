use super::clock::{Clock, SystemClock};
use super::types::{ceil_secs, LimiterConfig, RateLimitEntry, RateLimitResult};
use crate::error::Result;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// In-memory fixed-window rate limiter keyed by caller identity.
///
/// Each instance owns its counters; two limiters never share quota even for
/// the same caller key. Quotas are enforced per process only: replicas behind
/// a load balancer each count independently.
pub struct RateLimiter {
    config: LimiterConfig,
    entries: DashMap<String, RateLimitEntry>,
    clock: Arc<dyn Clock>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter backed by the system clock
    pub fn new(config: LimiterConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter reading time from `clock`
    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        info!(
            limiter = %config.name,
            max_requests = config.max_requests,
            window_ms = config.window_ms,
            "Initializing rate limiter"
        );

        Ok(Self {
            config,
            entries: DashMap::new(),
            clock,
            sweeper: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Count a request for `key` and decide whether it is admitted.
    ///
    /// The entry's shard stays write-locked for the whole read-modify-write,
    /// so concurrent checks and sweeps never observe a partial update.
    pub fn check(&self, key: &str) -> RateLimitResult {
        let now = self.clock.now_millis();
        let limit = self.config.max_requests;
        let window_ms = self.config.window_ms;

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(RateLimitEntry {
                window_start_ms: now,
                count: 0,
            });

        if entry.count == 0 || entry.is_expired(now, window_ms) {
            *entry = RateLimitEntry::fresh(now);
            debug!(limiter = %self.config.name, key = %key, "Opened new rate limit window");
            return RateLimitResult::allowed(limit, 1, reset_at(&entry, window_ms));
        }

        let reset_at = reset_at(&entry, window_ms);

        if entry.count < limit {
            entry.count += 1;
            return RateLimitResult::allowed(limit, entry.count, reset_at);
        }

        let retry_after = ceil_secs(entry.window_end_ms(window_ms).saturating_sub(now));
        warn!(
            limiter = %self.config.name,
            key = %key,
            retry_after_secs = retry_after,
            "Rate limit exceeded"
        );

        RateLimitResult::denied(limit, reset_at, retry_after)
    }

    /// Drop every entry whose window has fully elapsed; returns how many were removed
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_millis();
        let window_ms = self.config.window_ms;
        let mut removed = 0;

        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now, window_ms);
            if !keep {
                removed += 1;
            }
            keep
        });

        removed
    }

    /// Run `cleanup` every `every` on the tokio runtime until `destroy` is called.
    ///
    /// The task only holds a weak reference, so dropping the last handle to the
    /// limiter also ends the sweep. Starting a new sweep replaces the old one.
    pub fn start_cleanup(self: &Arc<Self>, every: Duration) {
        if every.is_zero() {
            warn!(limiter = %self.config.name, "Ignoring zero cleanup interval");
            return;
        }

        let limiter = Arc::downgrade(self);
        let name = self.config.name.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let Some(limiter) = limiter.upgrade() else {
                    debug!(limiter = %name, "Rate limiter dropped, stopping cleanup");
                    break;
                };

                let removed = limiter.cleanup();
                if removed > 0 {
                    debug!(limiter = %name, removed, "Cleaned up expired rate limit entries");
                }
            }
        });

        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Whether a background sweep is currently running
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Stop the background sweep and forget every counter
    pub fn destroy(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        self.entries.clear();
        debug!(limiter = %self.config.name, "Rate limiter destroyed");
    }

    /// Number of tracked caller keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn reset_at(entry: &RateLimitEntry, window_ms: u64) -> u64 {
    ceil_secs(entry.window_end_ms(window_ms))
}
