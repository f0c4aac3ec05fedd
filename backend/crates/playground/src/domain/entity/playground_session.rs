//! Playground Session Entity
//!
//! Represents a bound (user, browser) pair for the playground.
//! Stored in database with a header-carried HMAC-signed token reference.

use chrono::{DateTime, Utc};
use kernel::id::UserId;
use std::time::Duration;
use uuid::Uuid;

/// Playground session entity
#[derive(Debug, Clone)]
pub struct PlaygroundSession {
    /// Session ID (UUID v4), the token's payload
    pub session_id: Uuid,
    /// Owning user
    pub user_id: UserId,
    /// Hex fingerprint hash recorded at creation
    pub fingerprint_hash: String,
    /// Requests validated against this session (creation itself not counted)
    pub request_count: i32,
    /// Last validated request (Unix timestamp ms)
    pub last_request_at_ms: i64,
    /// Session expiration (Unix timestamp ms)
    pub expires_at_ms: i64,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl PlaygroundSession {
    /// Create a new session bound to (user, fingerprint)
    ///
    /// TTL is provided by the application layer (config), not hard-coded here.
    /// `last_request_at_ms` starts at creation time, so the next request is
    /// subject to the minimum inter-request interval.
    pub fn new(user_id: UserId, fingerprint_hash: String, ttl: Duration) -> Self {
        let now = Utc::now();

        Self {
            session_id: Uuid::new_v4(),
            user_id,
            fingerprint_hash,
            request_count: 0,
            last_request_at_ms: now.timestamp_millis(),
            expires_at_ms: now.timestamp_millis() + ttl.as_millis() as i64,
            created_at: now,
        }
    }

    /// Check if session has expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp_millis() > self.expires_at_ms
    }

    /// Session age in milliseconds at `now_ms`
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.created_at.timestamp_millis()).max(0)
    }

    /// Milliseconds left before the minimum inter-request interval is met
    ///
    /// Zero means the session may serve another request.
    pub fn interval_remaining_ms(&self, now_ms: i64, min_interval: Duration) -> i64 {
        let elapsed = now_ms - self.last_request_at_ms;
        (min_interval.as_millis() as i64 - elapsed).max(0)
    }

    /// Whether the session is due for token rotation
    ///
    /// `request_count` is checked after the current request was counted.
    pub fn needs_rotation(&self, now_ms: i64, after_requests: i32, after_age: Duration) -> bool {
        self.request_count >= after_requests || self.age_ms(now_ms) > after_age.as_millis() as i64
    }

    /// Build the replacement session for a rotation
    ///
    /// Same user and fingerprint, fresh token, counters, and expiry.
    pub fn rotate(&self, ttl: Duration) -> PlaygroundSession {
        PlaygroundSession::new(self.user_id, self.fingerprint_hash.clone(), ttl)
    }
}
