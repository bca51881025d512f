use crate::error::{GuardError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of one named limiter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Limiter name (e.g. "auth", "invite")
    pub name: String,
    /// Maximum number of requests allowed per window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl LimiterConfig {
    /// Create a validated limiter configuration
    pub fn new(name: impl Into<String>, max_requests: u32, window_ms: u64) -> Result<Self> {
        let config = Self {
            name: name.into(),
            max_requests,
            window_ms,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that could never admit a request
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(GuardError::Config(
                "Rate limiter name cannot be empty".to_string(),
            ));
        }
        if self.max_requests == 0 {
            return Err(GuardError::Config(format!(
                "Rate limit max_requests must be > 0 for limiter: {}",
                self.name
            )));
        }
        if self.window_ms == 0 {
            return Err(GuardError::Config(format!(
                "Rate limit window_ms must be > 0 for limiter: {}",
                self.name
            )));
        }
        Ok(())
    }

    /// Get the window as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Counter state for one caller key inside one limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Unix milliseconds at which the current window opened
    pub window_start_ms: u64,
    /// Requests admitted in the current window
    pub count: u32,
}

impl RateLimitEntry {
    pub(crate) fn fresh(now_ms: u64) -> Self {
        Self {
            window_start_ms: now_ms,
            count: 1,
        }
    }

    /// Whether the window has fully elapsed at `now_ms`
    pub fn is_expired(&self, now_ms: u64, window_ms: u64) -> bool {
        now_ms.saturating_sub(self.window_start_ms) >= window_ms
    }

    /// Unix milliseconds at which the window closes
    pub fn window_end_ms(&self, window_ms: u64) -> u64 {
        self.window_start_ms.saturating_add(window_ms)
    }
}

/// Rate limit decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Total limit
    pub limit: u32,
    /// Remaining requests in the current window
    pub remaining: u32,
    /// Unix seconds at which the current window resets
    pub reset_at: u64,
    /// Seconds to wait before retrying (0 when allowed)
    pub retry_after_secs: u64,
}

impl RateLimitResult {
    /// Create an allowed result
    pub fn allowed(limit: u32, count: u32, reset_at: u64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(count),
            reset_at,
            retry_after_secs: 0,
        }
    }

    /// Create a denied result
    pub fn denied(limit: u32, reset_at: u64, retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_at,
            retry_after_secs,
        }
    }
}

/// Integer ceiling of `ms / 1000`
pub(crate) fn ceil_secs(ms: u64) -> u64 {
    ms / 1000 + u64::from(ms % 1000 != 0)
}
