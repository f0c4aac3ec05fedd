//! In-Memory Counter Store
//!
//! Fixed-window counters held in process memory. Suitable for development,
//! tests, and single-instance deployments only: counters do not synchronize
//! across processes, which is exactly why production uses Redis.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use platform::rate_limit::{RateLimitConfig, RateLimitResult, RateLimitStore};

struct WindowEntry {
    count: u32,
    reset_at_ms: i64,
}

/// In-memory rate limit store
#[derive(Clone, Default)]
pub struct InMemoryRateLimitStore {
    windows: Arc<Mutex<HashMap<String, WindowEntry>>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries whose window has passed
    pub async fn cleanup(&self) {
        let now_ms = Utc::now().timestamp_millis();
        let mut windows = self.windows.lock().await;
        windows.retain(|_, entry| entry.reset_at_ms > now_ms);
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, Box<dyn std::error::Error + Send + Sync>> {
        let now_ms = Utc::now().timestamp_millis();
        let mut windows = self.windows.lock().await;

        let entry = windows
            .entry(key.to_string())
            .and_modify(|entry| {
                if entry.reset_at_ms <= now_ms {
                    entry.count = 1;
                    entry.reset_at_ms = now_ms + config.window.as_millis() as i64;
                } else {
                    entry.count += 1;
                }
            })
            .or_insert_with(|| WindowEntry {
                count: 1,
                reset_at_ms: now_ms + config.window.as_millis() as i64,
            });

        Ok(RateLimitResult {
            allowed: entry.count <= config.max_requests,
            count: entry.count,
            remaining: config.max_requests.saturating_sub(entry.count),
            reset_at_ms: entry.reset_at_ms,
        })
    }
}
