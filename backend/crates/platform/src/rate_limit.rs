//! Rate Limiting Infrastructure
//!
//! Common fixed-window rate limiting abstractions. The counter itself lives
//! in an external store so that limits hold across server processes; the
//! store must make the increment-and-expire step atomic per key.

use std::time::Duration;

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    pub fn window_secs(&self) -> u64 {
        self.window.as_secs()
    }
}

/// Rate limit check result
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    /// Requests observed in the current window, this one included
    pub count: u32,
    /// Requests left in the current window (0 when denied)
    pub remaining: u32,
    /// Unix timestamp (ms) at which the current window expires
    pub reset_at_ms: i64,
}

impl RateLimitResult {
    /// Seconds until the window resets, rounded up, never below 1
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let remaining_ms = (self.reset_at_ms - now_ms).max(0);
        ((remaining_ms + 999) / 1000).max(1) as u64
    }

    /// Unix timestamp (seconds) for the X-RateLimit-Reset header
    pub fn reset_at_secs(&self) -> i64 {
        self.reset_at_ms / 1000
    }
}

/// Trait for rate limit storage backends
///
/// Implementations must serialize concurrent increments for the same key:
/// two simultaneous requests must observe distinct counts.
#[trait_variant::make(RateLimitStore: Send)]
pub trait LocalRateLimitStore {
    /// Atomically increment the counter for `key`, starting a fresh window
    /// (count = 1, TTL = window length) when none is active.
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, Box<dyn std::error::Error + Send + Sync>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_window_secs() {
        let config = RateLimitConfig::new(20, 60);
        assert_eq!(config.max_requests, 20);
        assert_eq!(config.window_secs(), 60);
    }

    #[test]
    fn test_default_config_is_most_conservative_tier() {
        let config = RateLimitConfig::default();
        assert_eq!(config.max_requests, 5);
        assert_eq!(config.window, Duration::from_secs(60));
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let result = RateLimitResult {
            allowed: false,
            count: 6,
            remaining: 0,
            reset_at_ms: 10_500,
        };
        assert_eq!(result.retry_after_secs(10_000), 1);
        assert_eq!(result.retry_after_secs(8_100), 3);
        // Window already elapsed: still report a minimal wait
        assert_eq!(result.retry_after_secs(11_000), 1);
    }

    #[test]
    fn test_reset_at_secs() {
        let result = RateLimitResult {
            allowed: true,
            count: 1,
            remaining: 4,
            reset_at_ms: 1_700_000_060_000,
        };
        assert_eq!(result.reset_at_secs(), 1_700_000_060);
    }
}
