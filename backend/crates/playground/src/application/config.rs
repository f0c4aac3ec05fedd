//! Application Configuration
//!
//! Configuration for the playground guard layer.

use std::time::Duration;

/// What a gate does when its backing store fails or times out
///
/// Making this explicit configuration (rather than an implicit per-code-path
/// decision) keeps the fail-open/fail-closed asymmetry auditable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Let the request through, log the error
    Allow,
    /// Reject the request
    Deny,
}

impl FailurePolicy {
    pub fn allows(&self) -> bool {
        matches!(self, FailurePolicy::Allow)
    }
}

/// Playground guard configuration
#[derive(Debug, Clone)]
pub struct PlaygroundConfig {
    /// Free anonymous runs per fingerprint per calendar month
    pub anonymous_quota_limit: u32,
    /// Minimum interval between requests on one session
    pub session_min_interval: Duration,
    /// Rotate the session token after this many validated requests
    pub session_rotation_after_requests: i32,
    /// Rotate the session token after this session age
    pub session_rotation_after_age: Duration,
    /// Session TTL
    pub session_ttl: Duration,
    /// Session secret key for HMAC signing (32 bytes)
    pub session_secret: [u8; 32],
    /// Bounded timeout applied to every store call from a gate
    pub store_timeout: Duration,
    /// Fixed window length for the tiered rate limiter
    pub rate_limit_window: Duration,
    /// Purchase-attempt ceiling per window, regardless of tier
    pub purchase_max_requests: u32,
    /// Quota gate behavior on store failure
    pub quota_on_backend_error: FailurePolicy,
    /// Rate limiter behavior on store failure
    pub rate_limit_on_backend_error: FailurePolicy,
    /// Session validation behavior on store failure
    pub session_validation_on_backend_error: FailurePolicy,
    /// Session creation behavior on store failure
    ///
    /// Deny: a brand-new session has no prior trust to fall back on.
    pub session_creation_on_backend_error: FailurePolicy,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            anonymous_quota_limit: 1,
            session_min_interval: Duration::from_secs(30),
            session_rotation_after_requests: 10,
            session_rotation_after_age: Duration::from_secs(15 * 60),
            session_ttl: Duration::from_secs(3600),
            session_secret: [0u8; 32],
            store_timeout: Duration::from_secs(3),
            rate_limit_window: Duration::from_secs(60),
            purchase_max_requests: 3,
            quota_on_backend_error: FailurePolicy::Allow,
            rate_limit_on_backend_error: FailurePolicy::Allow,
            session_validation_on_backend_error: FailurePolicy::Allow,
            session_creation_on_backend_error: FailurePolicy::Deny,
        }
    }
}

impl PlaygroundConfig {
    /// Create config with a random session secret (for development)
    pub fn with_random_secret() -> Self {
        let bytes = platform::crypto::random_bytes(32);
        let mut secret = [0u8; 32];
        secret.copy_from_slice(&bytes);
        Self {
            session_secret: secret,
            ..Default::default()
        }
    }

    /// Create config for development
    pub fn development() -> Self {
        Self::with_random_secret()
    }

    pub fn min_interval_ms(&self) -> i64 {
        self.session_min_interval.as_millis() as i64
    }

    pub fn session_ttl_ms(&self) -> i64 {
        self.session_ttl.as_millis() as i64
    }
}
