//! Redis Counter Store
//!
//! Fixed-window counters backed by Redis so that limits hold across server
//! processes. INCR is atomic per key, which is what serializes concurrent
//! requests at a window boundary.

use chrono::Utc;
use redis::aio::ConnectionManager;

use platform::rate_limit::{RateLimitConfig, RateLimitResult, RateLimitStore};

/// Redis-backed rate limit store
#[derive(Clone)]
pub struct RedisRateLimitStore {
    connection_manager: ConnectionManager,
}

impl RedisRateLimitStore {
    /// Connect and verify the connection with a PING
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let connection_manager = ConnectionManager::new(client).await?;

        let mut conn = connection_manager.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;

        tracing::debug!("Connected to Redis for rate limiting");

        Ok(Self { connection_manager })
    }
}

impl RateLimitStore for RedisRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.connection_manager.clone();
        let window_secs = config.window_secs().max(1);

        let count: i64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;

        if count == 1 {
            let _: i64 = redis::cmd("EXPIRE")
                .arg(key)
                .arg(window_secs)
                .query_async(&mut conn)
                .await?;
        }

        let mut ttl: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
        if ttl < 0 {
            // Key exists without an expiry (EXPIRE lost after a failover);
            // restart the window rather than leaving an immortal counter
            let _: i64 = redis::cmd("EXPIRE")
                .arg(key)
                .arg(window_secs)
                .query_async(&mut conn)
                .await?;
            ttl = window_secs as i64;
        }

        let count = count.clamp(0, u32::MAX as i64) as u32;
        let now_ms = Utc::now().timestamp_millis();

        Ok(RateLimitResult {
            allowed: count <= config.max_requests,
            count,
            remaining: config.max_requests.saturating_sub(count),
            reset_at_ms: now_ms + ttl * 1000,
        })
    }
}
