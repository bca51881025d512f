//! Rate limiting module
//!
//! In-memory, fixed-window rate limiting keyed by caller identity:
//!
//! - **Fixed window**: each caller key gets `max_requests` per `window_ms`,
//!   the window opening on the key's first request
//! - **Named limiters**: every limiter owns an isolated key space
//! - **Cleanup**: expired entries are swept lazily on rollover and by an
//!   optional, cancellable background task
//! - Rate limit headers in responses (`X-RateLimit-*`, `Retry-After`)
//!
//! Counters live in process memory. Horizontally scaled replicas each enforce
//! their own quota; no cross-process coordination is attempted.
//!
//! # Example
//!
//! ```rust,no_run
//! use campus_guard::rate_limit::{LimiterConfig, RateLimiter};
//!
//! let config = LimiterConfig::new("auth", 5, 60_000).unwrap();
//! let limiter = RateLimiter::new(config).unwrap();
//!
//! let result = limiter.check("203.0.113.7");
//! assert!(result.allowed);
//! ```

pub mod client_ip;
pub mod clock;
pub mod limiter;
pub mod middleware;
pub mod set;
pub mod types;

// Re-export commonly used types
pub use client_ip::{extract_client_ip, HeaderLookup};
pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::RateLimiter;
pub use middleware::{add_rate_limit_headers, rate_limit_middleware};
pub use set::RateLimiterSet;
pub use types::{LimiterConfig, RateLimitEntry, RateLimitResult};
