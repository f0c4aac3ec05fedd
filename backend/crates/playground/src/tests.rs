//! Unit tests for the playground guard crate

#[cfg(test)]
mod support {
    //! Stub repositories and shared fixtures

    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::http::{HeaderMap, HeaderValue, header};
    use kernel::id::UserId;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use platform::client::RequestFingerprint;
    use platform::rate_limit::{RateLimitConfig, RateLimitResult, RateLimitStore};

    use crate::application::config::PlaygroundConfig;
    use crate::domain::entity::anonymous_usage::{AnonymousTracking, QuotaStatus, RecordedUsage};
    use crate::domain::entity::playground_session::PlaygroundSession;
    use crate::domain::repository::{QuotaRepository, SessionRepository, TierRepository};
    use crate::domain::value_object::identity::AuthenticatedUser;
    use crate::domain::value_object::month::UsageMonth;
    use crate::domain::value_object::tier::UserTier;
    use crate::error::{PlaygroundError, PlaygroundResult};

    pub fn test_config() -> Arc<PlaygroundConfig> {
        Arc::new(PlaygroundConfig::with_random_secret())
    }

    pub fn test_fingerprint() -> RequestFingerprint {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 Test Browser"),
        );
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US"));
        headers.insert(
            header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, br"),
        );
        RequestFingerprint::from_headers(&headers)
    }

    pub fn other_fingerprint() -> RequestFingerprint {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static("curl/8.0.1"),
        );
        RequestFingerprint::from_headers(&headers)
    }

    pub fn test_user() -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: UserId::new(),
            admin: false,
        }
    }

    /// Quota repository returning a fixed status
    #[derive(Clone)]
    pub struct FixedQuotaRepo {
        pub status: QuotaStatus,
    }

    impl QuotaRepository for FixedQuotaRepo {
        async fn check_quota(
            &self,
            _fingerprint_hash: &str,
            _month: &UsageMonth,
        ) -> PlaygroundResult<QuotaStatus> {
            Ok(self.status.clone())
        }

        async fn record_usage(
            &self,
            _tracking: &AnonymousTracking,
            _package_id: Option<&str>,
            _model: Option<&str>,
        ) -> PlaygroundResult<RecordedUsage> {
            Ok(RecordedUsage {
                success: true,
                usage_count: 1,
            })
        }
    }

    /// Quota repository whose store is down
    #[derive(Clone)]
    pub struct FailingQuotaRepo;

    impl QuotaRepository for FailingQuotaRepo {
        async fn check_quota(
            &self,
            _fingerprint_hash: &str,
            _month: &UsageMonth,
        ) -> PlaygroundResult<QuotaStatus> {
            Err(PlaygroundError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn record_usage(
            &self,
            _tracking: &AnonymousTracking,
            _package_id: Option<&str>,
            _model: Option<&str>,
        ) -> PlaygroundResult<RecordedUsage> {
            Err(PlaygroundError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    /// Quota repository with the guarded atomic increment the SQL function
    /// provides in production
    #[derive(Clone, Default)]
    pub struct CountingQuotaRepo {
        pub limit: i32,
        pub counts: Arc<Mutex<HashMap<(String, String), i32>>>,
    }

    impl CountingQuotaRepo {
        pub fn with_limit(limit: i32) -> Self {
            Self {
                limit,
                counts: Arc::new(Mutex::new(HashMap::new())),
            }
        }
    }

    impl QuotaRepository for CountingQuotaRepo {
        async fn check_quota(
            &self,
            fingerprint_hash: &str,
            month: &UsageMonth,
        ) -> PlaygroundResult<QuotaStatus> {
            let counts = self.counts.lock().await;
            let count = counts
                .get(&(fingerprint_hash.to_string(), month.to_string()))
                .copied()
                .unwrap_or(0);
            Ok(QuotaStatus {
                has_quota: count < self.limit,
                usage_count: count,
                first_used_at: None,
            })
        }

        async fn record_usage(
            &self,
            tracking: &AnonymousTracking,
            _package_id: Option<&str>,
            _model: Option<&str>,
        ) -> PlaygroundResult<RecordedUsage> {
            let mut counts = self.counts.lock().await;
            let count = counts
                .entry((tracking.fingerprint_hash.clone(), tracking.month.to_string()))
                .or_insert(0);
            if *count < self.limit {
                *count += 1;
                Ok(RecordedUsage {
                    success: true,
                    usage_count: *count,
                })
            } else {
                Ok(RecordedUsage {
                    success: false,
                    usage_count: *count,
                })
            }
        }
    }

    /// In-memory session repository with the same conditional-touch
    /// semantics as the SQL implementation
    #[derive(Clone, Default)]
    pub struct MemorySessionRepo {
        pub sessions: Arc<Mutex<HashMap<Uuid, PlaygroundSession>>>,
    }

    impl MemorySessionRepo {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn len(&self) -> usize {
            self.sessions.lock().await.len()
        }

        pub async fn only_session(&self) -> PlaygroundSession {
            let sessions = self.sessions.lock().await;
            assert_eq!(sessions.len(), 1, "expected exactly one session");
            sessions.values().next().cloned().expect("one session")
        }

        pub async fn with_session_mut<F>(&self, session_id: Uuid, f: F)
        where
            F: FnOnce(&mut PlaygroundSession),
        {
            let mut sessions = self.sessions.lock().await;
            f(sessions.get_mut(&session_id).expect("session exists"));
        }
    }

    impl SessionRepository for MemorySessionRepo {
        async fn create(&self, session: &PlaygroundSession) -> PlaygroundResult<()> {
            self.sessions
                .lock()
                .await
                .insert(session.session_id, session.clone());
            Ok(())
        }

        async fn find_by_id(
            &self,
            session_id: Uuid,
        ) -> PlaygroundResult<Option<PlaygroundSession>> {
            Ok(self.sessions.lock().await.get(&session_id).cloned())
        }

        async fn touch(
            &self,
            session_id: Uuid,
            now_ms: i64,
            min_interval_ms: i64,
        ) -> PlaygroundResult<Option<i32>> {
            let mut sessions = self.sessions.lock().await;
            match sessions.get_mut(&session_id) {
                Some(session) if session.last_request_at_ms <= now_ms - min_interval_ms => {
                    session.last_request_at_ms = now_ms;
                    session.request_count += 1;
                    Ok(Some(session.request_count))
                }
                _ => Ok(None),
            }
        }

        async fn replace(
            &self,
            old_session_id: Uuid,
            new_session: &PlaygroundSession,
        ) -> PlaygroundResult<()> {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(&old_session_id);
            sessions.insert(new_session.session_id, new_session.clone());
            Ok(())
        }

        async fn delete(&self, session_id: Uuid) -> PlaygroundResult<()> {
            self.sessions.lock().await.remove(&session_id);
            Ok(())
        }

        async fn delete_all_for_user(&self, user_id: &UserId) -> PlaygroundResult<u64> {
            let mut sessions = self.sessions.lock().await;
            let before = sessions.len();
            sessions.retain(|_, session| session.user_id != *user_id);
            Ok((before - sessions.len()) as u64)
        }

        async fn cleanup_expired(&self) -> PlaygroundResult<u64> {
            let now_ms = chrono::Utc::now().timestamp_millis();
            let mut sessions = self.sessions.lock().await;
            let before = sessions.len();
            sessions.retain(|_, session| session.expires_at_ms >= now_ms);
            Ok((before - sessions.len()) as u64)
        }
    }

    /// Session repository whose store is down
    #[derive(Clone)]
    pub struct FailingSessionRepo;

    impl SessionRepository for FailingSessionRepo {
        async fn create(&self, _session: &PlaygroundSession) -> PlaygroundResult<()> {
            Err(PlaygroundError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn find_by_id(
            &self,
            _session_id: Uuid,
        ) -> PlaygroundResult<Option<PlaygroundSession>> {
            Err(PlaygroundError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn touch(
            &self,
            _session_id: Uuid,
            _now_ms: i64,
            _min_interval_ms: i64,
        ) -> PlaygroundResult<Option<i32>> {
            Err(PlaygroundError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn replace(
            &self,
            _old_session_id: Uuid,
            _new_session: &PlaygroundSession,
        ) -> PlaygroundResult<()> {
            Err(PlaygroundError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn delete(&self, _session_id: Uuid) -> PlaygroundResult<()> {
            Err(PlaygroundError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn delete_all_for_user(&self, _user_id: &UserId) -> PlaygroundResult<u64> {
            Err(PlaygroundError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn cleanup_expired(&self) -> PlaygroundResult<u64> {
            Err(PlaygroundError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    /// Tier repository returning a fixed tier
    #[derive(Clone)]
    pub struct FixedTierRepo(pub UserTier);

    impl TierRepository for FixedTierRepo {
        async fn tier_for_user(&self, _user_id: &UserId) -> PlaygroundResult<UserTier> {
            Ok(self.0)
        }
    }

    /// Tier repository whose store is down
    #[derive(Clone)]
    pub struct FailingTierRepo;

    impl TierRepository for FailingTierRepo {
        async fn tier_for_user(&self, _user_id: &UserId) -> PlaygroundResult<UserTier> {
            Err(PlaygroundError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    /// Counter store whose backend is down
    #[derive(Clone)]
    pub struct FailingRateLimitStore;

    impl RateLimitStore for FailingRateLimitStore {
        async fn check_and_increment(
            &self,
            _key: &str,
            _config: &RateLimitConfig,
        ) -> Result<RateLimitResult, Box<dyn std::error::Error + Send + Sync>> {
            Err("counter store down".into())
        }
    }

    /// Shorthand for gate configs with tweaked policies/intervals
    pub fn config_with<F>(f: F) -> Arc<PlaygroundConfig>
    where
        F: FnOnce(&mut PlaygroundConfig),
    {
        let mut config = PlaygroundConfig::with_random_secret();
        f(&mut config);
        Arc::new(config)
    }
}

#[cfg(test)]
mod token_tests {
    use crate::application::session::{sign_session_token, verify_session_token};
    use uuid::Uuid;

    #[test]
    fn test_token_roundtrip() {
        let secret = [7u8; 32];
        let session_id = Uuid::new_v4();

        let token = sign_session_token(session_id, &secret);
        assert_eq!(verify_session_token(&token, &secret), Some(session_id));
    }

    #[test]
    fn test_token_rejects_wrong_secret() {
        let session_id = Uuid::new_v4();
        let token = sign_session_token(session_id, &[7u8; 32]);

        assert_eq!(verify_session_token(&token, &[8u8; 32]), None);
    }

    #[test]
    fn test_token_rejects_tampering() {
        let secret = [7u8; 32];
        let token = sign_session_token(Uuid::new_v4(), &secret);

        let mut data = platform::crypto::from_base64(&token).unwrap();
        data[0] ^= 0x01;
        let tampered = platform::crypto::to_base64(&data);

        assert_eq!(verify_session_token(&tampered, &secret), None);
    }

    #[test]
    fn test_token_rejects_malformed_input() {
        let secret = [7u8; 32];

        assert_eq!(verify_session_token("", &secret), None);
        assert_eq!(verify_session_token("not base64!!", &secret), None);
        // Valid base64 but wrong length
        let short = platform::crypto::to_base64(b"too short");
        assert_eq!(verify_session_token(&short, &secret), None);
    }
}

#[cfg(test)]
mod config_tests {
    use crate::application::config::{FailurePolicy, PlaygroundConfig};
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = PlaygroundConfig::default();

        assert_eq!(config.anonymous_quota_limit, 1);
        assert_eq!(config.session_min_interval, Duration::from_secs(30));
        assert_eq!(config.session_rotation_after_requests, 10);
        assert_eq!(config.session_rotation_after_age, Duration::from_secs(900));
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.purchase_max_requests, 3);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
    }

    #[test]
    fn test_default_failure_policies() {
        let config = PlaygroundConfig::default();

        // Everything fails open except initial session creation
        assert_eq!(config.quota_on_backend_error, FailurePolicy::Allow);
        assert_eq!(config.rate_limit_on_backend_error, FailurePolicy::Allow);
        assert_eq!(
            config.session_validation_on_backend_error,
            FailurePolicy::Allow
        );
        assert_eq!(
            config.session_creation_on_backend_error,
            FailurePolicy::Deny
        );
    }

    #[test]
    fn test_with_random_secret() {
        let config1 = PlaygroundConfig::with_random_secret();
        let config2 = PlaygroundConfig::with_random_secret();

        assert_ne!(config1.session_secret, config2.session_secret);
        assert!(config1.session_secret.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_millisecond_helpers() {
        let config = PlaygroundConfig::default();
        assert_eq!(config.min_interval_ms(), 30_000);
        assert_eq!(config.session_ttl_ms(), 3_600_000);
    }
}

#[cfg(test)]
mod domain_tests {
    use crate::domain::entity::playground_session::PlaygroundSession;
    use crate::domain::value_object::month::UsageMonth;
    use crate::domain::value_object::tier::UserTier;
    use kernel::id::UserId;
    use std::time::Duration;

    fn session() -> PlaygroundSession {
        PlaygroundSession::new(UserId::new(), "abc123".to_string(), Duration::from_secs(3600))
    }

    #[test]
    fn test_session_creation() {
        let session = session();

        assert_eq!(session.request_count, 0);
        assert!(!session.is_expired());
        assert_eq!(session.fingerprint_hash, "abc123");
        assert_eq!(
            session.expires_at_ms,
            session.created_at.timestamp_millis() + 3_600_000
        );
    }

    #[test]
    fn test_fingerprint_hash_is_a_sha256_digest() {
        let fingerprint = super::support::test_fingerprint();
        let digest = hex::decode(&fingerprint.hash).expect("hash is hex");
        assert_eq!(digest.len(), 32);
    }

    #[test]
    fn test_interval_remaining() {
        let session = session();
        let interval = Duration::from_secs(30);
        let created_ms = session.last_request_at_ms;

        // Right after creation the whole interval remains
        let remaining = session.interval_remaining_ms(created_ms, interval);
        assert_eq!(remaining, 30_000);

        // Partway through
        assert_eq!(
            session.interval_remaining_ms(created_ms + 12_000, interval),
            18_000
        );

        // Interval elapsed
        assert_eq!(
            session.interval_remaining_ms(created_ms + 30_000, interval),
            0
        );
        assert_eq!(
            session.interval_remaining_ms(created_ms + 60_000, interval),
            0
        );
    }

    #[test]
    fn test_needs_rotation_by_request_count() {
        let mut session = session();
        let now_ms = session.created_at.timestamp_millis();

        session.request_count = 9;
        assert!(!session.needs_rotation(now_ms, 10, Duration::from_secs(900)));

        session.request_count = 10;
        assert!(session.needs_rotation(now_ms, 10, Duration::from_secs(900)));
    }

    #[test]
    fn test_needs_rotation_by_age() {
        let session = session();
        let created_ms = session.created_at.timestamp_millis();

        assert!(!session.needs_rotation(
            created_ms + 900_000,
            10,
            Duration::from_secs(900)
        ));
        assert!(session.needs_rotation(
            created_ms + 900_001,
            10,
            Duration::from_secs(900)
        ));
    }

    #[test]
    fn test_rotate_binds_same_user_and_fingerprint() {
        let mut session = session();
        session.request_count = 10;

        let next = session.rotate(Duration::from_secs(3600));

        assert_ne!(next.session_id, session.session_id);
        assert_eq!(next.user_id, session.user_id);
        assert_eq!(next.fingerprint_hash, session.fingerprint_hash);
        assert_eq!(next.request_count, 0);
    }

    #[test]
    fn test_usage_month_format() {
        let month = UsageMonth::current();
        assert!(UsageMonth::parse(month.as_str()).is_some());
        assert_eq!(month.as_str().len(), 7);
        assert_eq!(&month.as_str()[4..5], "-");
    }

    #[test]
    fn test_usage_month_parse() {
        assert!(UsageMonth::parse("2026-08").is_some());
        assert!(UsageMonth::parse("2026-12").is_some());
        assert!(UsageMonth::parse("2026-13").is_none());
        assert!(UsageMonth::parse("2026-00").is_none());
        assert!(UsageMonth::parse("26-08").is_none());
        assert!(UsageMonth::parse("garbage").is_none());
    }

    #[test]
    fn test_tier_limits() {
        assert_eq!(UserTier::Free.requests_per_minute(), 5);
        assert_eq!(UserTier::Subscriber.requests_per_minute(), 20);
        assert_eq!(UserTier::VerifiedOrgMember.requests_per_minute(), 100);
    }

    #[test]
    fn test_tier_codes() {
        assert_eq!(UserTier::Free.code(), "free");
        assert_eq!(UserTier::Subscriber.code(), "subscriber");
        assert_eq!(UserTier::VerifiedOrgMember.code(), "verified-org-member");

        assert_eq!(UserTier::from_code("subscriber"), UserTier::Subscriber);
        assert_eq!(
            UserTier::from_code("verified-org-member"),
            UserTier::VerifiedOrgMember
        );
        // Unknown codes degrade to the most conservative tier
        assert_eq!(UserTier::from_code("enterprise"), UserTier::Free);
    }
}

#[cfg(test)]
mod error_tests {
    use crate::error::PlaygroundError;
    use axum::http::StatusCode;

    fn quota_exceeded() -> PlaygroundError {
        PlaygroundError::QuotaExceeded {
            quota_limit: 1,
            usage_count: 1,
            current_month: "2026-08".to_string(),
            first_used_at: None,
        }
    }

    #[test]
    fn test_status_codes() {
        let cases: Vec<(PlaygroundError, StatusCode)> = vec![
            (quota_exceeded(), StatusCode::FORBIDDEN),
            (
                PlaygroundError::RateLimitExceeded {
                    limit: 5,
                    retry_after_secs: 30,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                PlaygroundError::SessionRateLimited {
                    retry_after_secs: 12,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (PlaygroundError::FingerprintMismatch, StatusCode::FORBIDDEN),
            (PlaygroundError::SessionExpired, StatusCode::UNAUTHORIZED),
            (PlaygroundError::InvalidSessionToken, StatusCode::BAD_REQUEST),
            (
                PlaygroundError::SessionCreationFailed,
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status_code(), expected, "{}", error);
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(quota_exceeded().code(), "anonymous_quota_exceeded");
        assert_eq!(
            PlaygroundError::RateLimitExceeded {
                limit: 5,
                retry_after_secs: 1
            }
            .code(),
            "rate_limit_exceeded"
        );
        assert_eq!(
            PlaygroundError::SessionRateLimited { retry_after_secs: 1 }.code(),
            "session_rate_limit_exceeded"
        );
        assert_eq!(
            PlaygroundError::FingerprintMismatch.code(),
            "session_validation_failed"
        );
        assert_eq!(PlaygroundError::SessionExpired.code(), "session_expired");
        assert_eq!(
            PlaygroundError::InvalidSessionToken.code(),
            "invalid_session_token"
        );
        assert_eq!(
            PlaygroundError::SessionCreationFailed.code(),
            "session_creation_failed"
        );
    }

    #[test]
    fn test_quota_exceeded_body_contract() {
        let body = quota_exceeded().to_app_error().to_body();

        assert_eq!(body["error"], "anonymous_quota_exceeded");
        assert_eq!(body["details"]["quotaLimit"], 1);
        assert_eq!(body["details"]["usageCount"], 1);
        assert_eq!(body["details"]["currentMonth"], "2026-08");
        assert!(body["details"].get("firstUsedAt").is_some());

        // The call to action is part of the contract, not decoration
        assert_eq!(body["callToAction"]["registrationUrl"], "/register");
        let benefits = body["callToAction"]["benefits"].as_array().unwrap();
        assert!(
            benefits
                .iter()
                .any(|b| b.as_str().unwrap().to_lowercase().contains("unlimited"))
        );
    }

    #[test]
    fn test_rate_limit_body_contract() {
        let error = PlaygroundError::RateLimitExceeded {
            limit: 20,
            retry_after_secs: 42,
        };
        let body = error.to_app_error().to_body();

        assert_eq!(body["error"], "rate_limit_exceeded");
        assert_eq!(body["retryAfter"], 42);
        assert_eq!(body["details"]["limit"], 20);
        assert_eq!(body["callToAction"]["upgradeUrl"], "/pricing");
    }

    #[test]
    fn test_session_rate_limited_body() {
        let error = PlaygroundError::SessionRateLimited {
            retry_after_secs: 17,
        };
        let body = error.to_app_error().to_body();

        assert_eq!(body["error"], "session_rate_limit_exceeded");
        assert_eq!(body["retryAfter"], 17);
        assert!(body.get("details").is_some());
    }

    #[test]
    fn test_backend_failure_classification() {
        assert!(PlaygroundError::StoreTimeout.is_backend_failure());
        assert!(PlaygroundError::CounterStore("down".to_string()).is_backend_failure());
        assert!(!quota_exceeded().is_backend_failure());
        assert!(!PlaygroundError::SessionExpired.is_backend_failure());
    }
}

#[cfg(test)]
mod dto_tests {
    use crate::presentation::dto::*;

    #[test]
    fn test_run_request_deserialization() {
        let json = r#"{"packageId":"serde","model":"small","source":"fn main() {}"}"#;
        let request: RunRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.package_id.as_deref(), Some("serde"));
        assert_eq!(request.model.as_deref(), Some("small"));
        assert_eq!(request.source.as_deref(), Some("fn main() {}"));
    }

    #[test]
    fn test_run_request_all_fields_optional() {
        let request: RunRequest = serde_json::from_str("{}").unwrap();
        assert!(request.package_id.is_none());
        assert!(request.model.is_none());
        assert!(request.source.is_none());
    }

    #[test]
    fn test_run_response_serialization() {
        let response = RunResponse {
            status: "accepted",
            package_id: Some("serde".to_string()),
            model: None,
        };
        let json = serde_json::to_string(&response).unwrap();

        assert!(json.contains(r#""status":"accepted""#));
        assert!(json.contains(r#""packageId":"serde""#));
    }

    #[test]
    fn test_revoke_dto_roundtrip() {
        let json = r#"{"userId":"00000000-0000-0000-0000-000000000000"}"#;
        let request: RevokeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.user_id, uuid::Uuid::nil());

        let response = RevokeResponse { revoked: 3 };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""revoked":3"#));
    }
}

#[cfg(test)]
mod memory_store_tests {
    use crate::infra::memory::InMemoryRateLimitStore;
    use platform::rate_limit::{RateLimitConfig, RateLimitStore};
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_request_starts_window() {
        let store = InMemoryRateLimitStore::new();
        let config = RateLimitConfig::new(5, 60);

        let result = store.check_and_increment("ratelimit:playground:u1", &config);
        let result = result.await.unwrap();

        assert!(result.allowed);
        assert_eq!(result.count, 1);
        assert_eq!(result.remaining, 4);
    }

    #[tokio::test]
    async fn test_limit_boundary() {
        let store = InMemoryRateLimitStore::new();
        let config = RateLimitConfig::new(3, 60);
        let key = "ratelimit:playground:u2";

        for i in 1..=3u32 {
            let result = store.check_and_increment(key, &config).await.unwrap();
            assert!(result.allowed, "request {i} should pass");
            assert_eq!(result.count, i);
        }

        let result = store.check_and_increment(key, &config).await.unwrap();
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);

        let now_ms = chrono::Utc::now().timestamp_millis();
        assert!(result.retry_after_secs(now_ms) <= 60);
    }

    #[tokio::test]
    async fn test_window_reset() {
        let store = InMemoryRateLimitStore::new();
        let config = RateLimitConfig {
            max_requests: 1,
            window: Duration::from_millis(40),
        };
        let key = "ratelimit:playground:u3";

        assert!(store.check_and_increment(key, &config).await.unwrap().allowed);
        assert!(!store.check_and_increment(key, &config).await.unwrap().allowed);

        tokio::time::sleep(Duration::from_millis(60)).await;

        let result = store.check_and_increment(key, &config).await.unwrap();
        assert!(result.allowed, "request in the next window should pass");
        assert_eq!(result.count, 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = InMemoryRateLimitStore::new();
        let config = RateLimitConfig::new(1, 60);

        assert!(
            store
                .check_and_increment("ratelimit:playground:a", &config)
                .await
                .unwrap()
                .allowed
        );
        assert!(
            store
                .check_and_increment("ratelimit:playground:b", &config)
                .await
                .unwrap()
                .allowed
        );
        assert!(
            !store
                .check_and_increment("ratelimit:playground:a", &config)
                .await
                .unwrap()
                .allowed
        );
    }

    #[tokio::test]
    async fn test_cleanup_drops_stale_windows() {
        let store = InMemoryRateLimitStore::new();
        let config = RateLimitConfig {
            max_requests: 1,
            window: Duration::from_millis(10),
        };

        store
            .check_and_increment("ratelimit:playground:stale", &config)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        store.cleanup().await;

        let result = store
            .check_and_increment("ratelimit:playground:stale", &config)
            .await
            .unwrap();
        assert_eq!(result.count, 1);
    }
}

#[cfg(test)]
mod quota_gate_tests {
    use super::support::*;
    use crate::application::check_quota::{CheckQuotaUseCase, QuotaGate};
    use crate::application::config::FailurePolicy;
    use crate::domain::entity::anonymous_usage::QuotaStatus;
    use crate::domain::value_object::month::UsageMonth;
    use crate::error::PlaygroundError;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_allows_and_attaches_tracking() {
        let repo = Arc::new(FixedQuotaRepo {
            status: QuotaStatus {
                has_quota: true,
                usage_count: 0,
                first_used_at: None,
            },
        });
        let gate = CheckQuotaUseCase::new(repo, test_config());

        let fingerprint = test_fingerprint();
        let outcome = gate
            .execute(&fingerprint, Some("203.0.113.50".parse().unwrap()))
            .await;

        match outcome {
            QuotaGate::Allowed(Some(tracking)) => {
                assert_eq!(tracking.fingerprint_hash, fingerprint.hash);
                assert_eq!(tracking.client_ip, "203.0.113.50");
                assert_eq!(tracking.ip_subnet, "203.0.113.0");
                assert_eq!(tracking.month, UsageMonth::current());
                assert!(tracking.user_agent.is_some());
            }
            other => panic!("expected Allowed with tracking, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_ip_tracked_as_unknown() {
        let repo = Arc::new(FixedQuotaRepo {
            status: QuotaStatus {
                has_quota: true,
                usage_count: 0,
                first_used_at: None,
            },
        });
        let gate = CheckQuotaUseCase::new(repo, test_config());

        match gate.execute(&test_fingerprint(), None).await {
            QuotaGate::Allowed(Some(tracking)) => {
                assert_eq!(tracking.client_ip, "unknown");
                assert_eq!(tracking.ip_subnet, "unknown");
            }
            other => panic!("expected Allowed with tracking, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_denies_when_quota_spent() {
        let repo = Arc::new(FixedQuotaRepo {
            status: QuotaStatus {
                has_quota: false,
                usage_count: 1,
                first_used_at: Some(chrono::Utc::now()),
            },
        });
        let gate = CheckQuotaUseCase::new(repo, test_config());

        match gate.execute(&test_fingerprint(), None).await {
            QuotaGate::Denied(PlaygroundError::QuotaExceeded {
                quota_limit,
                usage_count,
                ..
            }) => {
                assert_eq!(quota_limit, 1);
                assert_eq!(usage_count, 1);
            }
            other => panic!("expected quota denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fails_open_on_store_error() {
        let gate = CheckQuotaUseCase::new(Arc::new(FailingQuotaRepo), test_config());

        match gate.execute(&test_fingerprint(), None).await {
            QuotaGate::Allowed(tracking) => {
                // No tracking: nothing gets recorded for a fail-open pass
                assert!(tracking.is_none());
            }
            other => panic!("expected fail-open allow, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fails_closed_when_configured() {
        let config = config_with(|c| c.quota_on_backend_error = FailurePolicy::Deny);
        let gate = CheckQuotaUseCase::new(Arc::new(FailingQuotaRepo), config);

        match gate.execute(&test_fingerprint(), None).await {
            QuotaGate::Denied(e) => assert!(e.is_backend_failure()),
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_single_grant_under_concurrency() {
        let repo = Arc::new(CountingQuotaRepo::with_limit(1));
        let fingerprint = test_fingerprint();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            let hash = fingerprint.hash.clone();
            handles.push(tokio::spawn(async move {
                let tracking = crate::domain::entity::anonymous_usage::AnonymousTracking {
                    fingerprint_hash: hash,
                    client_ip: "203.0.113.50".to_string(),
                    ip_subnet: "203.0.113.0".to_string(),
                    user_agent: None,
                    month: UsageMonth::current(),
                };
                use crate::domain::repository::QuotaRepository;
                repo.record_usage(&tracking, None, None).await.unwrap()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            let recorded = handle.await.unwrap();
            if recorded.success {
                successes += 1;
            }
            assert!(recorded.usage_count <= 1, "count must never pass the cap");
        }

        assert_eq!(successes, 1, "exactly one concurrent grant may succeed");
    }
}

#[cfg(test)]
mod rate_limit_gate_tests {
    use super::support::*;
    use crate::application::rate_limit::{RateLimitGate, TieredRateLimitUseCase};
    use crate::domain::value_object::tier::UserTier;
    use crate::error::PlaygroundError;
    use crate::infra::memory::InMemoryRateLimitStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_free_tier_limit_enforced() {
        let limiter = TieredRateLimitUseCase::new(
            Arc::new(FixedTierRepo(UserTier::Free)),
            Arc::new(InMemoryRateLimitStore::new()),
            test_config(),
        );
        let user = test_user();

        for _ in 0..5 {
            match limiter.execute(&user).await {
                RateLimitGate::Allowed(Some(decision)) => assert_eq!(decision.limit, 5),
                other => panic!("expected allow, got {other:?}"),
            }
        }

        match limiter.execute(&user).await {
            RateLimitGate::Denied(PlaygroundError::RateLimitExceeded {
                limit,
                retry_after_secs,
            }) => {
                assert_eq!(limit, 5);
                assert!(retry_after_secs <= 60);
            }
            other => panic!("expected 6th request denied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscriber_tier_gets_higher_ceiling() {
        let limiter = TieredRateLimitUseCase::new(
            Arc::new(FixedTierRepo(UserTier::Subscriber)),
            Arc::new(InMemoryRateLimitStore::new()),
            test_config(),
        );

        match limiter.execute(&test_user()).await {
            RateLimitGate::Allowed(Some(decision)) => {
                assert_eq!(decision.limit, 20);
                assert_eq!(decision.remaining, 19);
            }
            other => panic!("expected allow, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tier_lookup_failure_degrades_to_free() {
        let limiter = TieredRateLimitUseCase::new(
            Arc::new(FailingTierRepo),
            Arc::new(InMemoryRateLimitStore::new()),
            test_config(),
        );

        match limiter.execute(&test_user()).await {
            RateLimitGate::Allowed(Some(decision)) => assert_eq!(decision.limit, 5),
            other => panic!("expected allow at free tier, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_counter_store_failure_fails_open() {
        let limiter = TieredRateLimitUseCase::new(
            Arc::new(FixedTierRepo(UserTier::Free)),
            Arc::new(FailingRateLimitStore),
            test_config(),
        );

        match limiter.execute(&test_user()).await {
            RateLimitGate::Allowed(decision) => assert!(decision.is_none()),
            other => panic!("expected fail-open allow, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_purchase_limit_is_tier_independent() {
        let limiter = TieredRateLimitUseCase::new(
            Arc::new(FixedTierRepo(UserTier::VerifiedOrgMember)),
            Arc::new(InMemoryRateLimitStore::new()),
            test_config(),
        );
        let user = test_user();

        for _ in 0..3 {
            match limiter.execute_purchase(&user).await {
                RateLimitGate::Allowed(Some(decision)) => assert_eq!(decision.limit, 3),
                other => panic!("expected allow, got {other:?}"),
            }
        }

        assert!(matches!(
            limiter.execute_purchase(&user).await,
            RateLimitGate::Denied(PlaygroundError::RateLimitExceeded { limit: 3, .. })
        ));

        // The playground key is a different namespace: still open
        assert!(matches!(
            limiter.execute(&user).await,
            RateLimitGate::Allowed(Some(_))
        ));
    }
}

#[cfg(test)]
mod session_gate_tests {
    use super::support::*;
    use crate::application::config::FailurePolicy;
    use crate::application::session::{
        SessionGate, SessionGuardUseCase, sign_session_token, verify_session_token,
    };
    use crate::error::PlaygroundError;
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_establish_creates_bound_session() {
        let repo = Arc::new(MemorySessionRepo::new());
        let config = test_config();
        let guard = SessionGuardUseCase::new(repo.clone(), config.clone());
        let user = test_user();
        let fingerprint = test_fingerprint();

        let gate = guard.establish(&user, &fingerprint).await;

        let ticket = match gate {
            SessionGate::Established(ticket) => ticket,
            other => panic!("expected Established, got {other:?}"),
        };
        assert_eq!(ticket.request_count, 0);
        assert!(!ticket.rotated);

        let session = repo.only_session().await;
        assert_eq!(
            verify_session_token(&ticket.token, &config.session_secret),
            Some(session.session_id)
        );
        assert_eq!(session.user_id, user.user_id);
        assert_eq!(session.fingerprint_hash, fingerprint.hash);
    }

    #[tokio::test]
    async fn test_establish_fails_closed_on_store_error() {
        let guard = SessionGuardUseCase::new(Arc::new(FailingSessionRepo), test_config());

        let gate = guard.establish(&test_user(), &test_fingerprint()).await;

        assert!(matches!(
            gate,
            SessionGate::Denied(PlaygroundError::SessionCreationFailed)
        ));
    }

    #[tokio::test]
    async fn test_establish_can_be_configured_to_fail_open() {
        let config = config_with(|c| c.session_creation_on_backend_error = FailurePolicy::Allow);
        let guard = SessionGuardUseCase::new(Arc::new(FailingSessionRepo), config);

        let gate = guard.establish(&test_user(), &test_fingerprint()).await;

        assert!(matches!(gate, SessionGate::FailOpen));
    }

    #[tokio::test]
    async fn test_validate_rejects_garbage_token() {
        let guard = SessionGuardUseCase::new(Arc::new(MemorySessionRepo::new()), test_config());

        let gate = guard
            .validate("not-a-token", &test_user(), &test_fingerprint())
            .await;

        assert!(matches!(
            gate,
            SessionGate::Denied(PlaygroundError::InvalidSessionToken)
        ));
    }

    #[tokio::test]
    async fn test_validate_rejects_unknown_session() {
        let config = test_config();
        let guard = SessionGuardUseCase::new(Arc::new(MemorySessionRepo::new()), config.clone());

        // Correctly signed token whose session row does not exist
        let token = sign_session_token(Uuid::new_v4(), &config.session_secret);
        let gate = guard
            .validate(&token, &test_user(), &test_fingerprint())
            .await;

        assert!(matches!(
            gate,
            SessionGate::Denied(PlaygroundError::InvalidSessionToken)
        ));
    }

    #[tokio::test]
    async fn test_second_request_inside_interval_is_limited() {
        let repo = Arc::new(MemorySessionRepo::new());
        let guard = SessionGuardUseCase::new(repo.clone(), test_config());
        let user = test_user();
        let fingerprint = test_fingerprint();

        let ticket = match guard.establish(&user, &fingerprint).await {
            SessionGate::Established(ticket) => ticket,
            other => panic!("expected Established, got {other:?}"),
        };

        let gate = guard.validate(&ticket.token, &user, &fingerprint).await;

        match gate {
            SessionGate::Denied(PlaygroundError::SessionRateLimited { retry_after_secs }) => {
                assert!(retry_after_secs >= 1 && retry_after_secs <= 30);
            }
            other => panic!("expected session rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_after_interval_succeeds() {
        let repo = Arc::new(MemorySessionRepo::new());
        let guard = SessionGuardUseCase::new(repo.clone(), test_config());
        let user = test_user();
        let fingerprint = test_fingerprint();

        let ticket = match guard.establish(&user, &fingerprint).await {
            SessionGate::Established(ticket) => ticket,
            other => panic!("expected Established, got {other:?}"),
        };

        let session = repo.only_session().await;
        repo.with_session_mut(session.session_id, |s| {
            s.last_request_at_ms -= 31_000;
        })
        .await;

        match guard.validate(&ticket.token, &user, &fingerprint).await {
            SessionGate::Validated(validated) => {
                assert_eq!(validated.request_count, 1);
                assert!(!validated.rotated);
                assert_eq!(validated.token, ticket.token);
            }
            other => panic!("expected Validated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fingerprint_mismatch_is_rejected() {
        let repo = Arc::new(MemorySessionRepo::new());
        let guard = SessionGuardUseCase::new(repo.clone(), test_config());
        let user = test_user();

        let ticket = match guard.establish(&user, &test_fingerprint()).await {
            SessionGate::Established(ticket) => ticket,
            other => panic!("expected Established, got {other:?}"),
        };

        let session = repo.only_session().await;
        repo.with_session_mut(session.session_id, |s| {
            s.last_request_at_ms -= 31_000;
        })
        .await;

        // Same valid token, different client fingerprint: possible theft
        let gate = guard.validate(&ticket.token, &user, &other_fingerprint()).await;

        assert!(matches!(
            gate,
            SessionGate::Denied(PlaygroundError::FingerprintMismatch)
        ));
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected_and_deleted() {
        let repo = Arc::new(MemorySessionRepo::new());
        let guard = SessionGuardUseCase::new(repo.clone(), test_config());
        let user = test_user();
        let fingerprint = test_fingerprint();

        let ticket = match guard.establish(&user, &fingerprint).await {
            SessionGate::Established(ticket) => ticket,
            other => panic!("expected Established, got {other:?}"),
        };

        let session = repo.only_session().await;
        repo.with_session_mut(session.session_id, |s| {
            s.expires_at_ms = chrono::Utc::now().timestamp_millis() - 1_000;
        })
        .await;

        let gate = guard.validate(&ticket.token, &user, &fingerprint).await;

        assert!(matches!(
            gate,
            SessionGate::Denied(PlaygroundError::SessionExpired)
        ));
        assert_eq!(repo.len().await, 0, "expired session should be deleted");
    }

    #[tokio::test]
    async fn test_token_of_another_user_is_rejected() {
        let repo = Arc::new(MemorySessionRepo::new());
        let guard = SessionGuardUseCase::new(repo.clone(), test_config());
        let owner = test_user();
        let fingerprint = test_fingerprint();

        let ticket = match guard.establish(&owner, &fingerprint).await {
            SessionGate::Established(ticket) => ticket,
            other => panic!("expected Established, got {other:?}"),
        };

        let gate = guard.validate(&ticket.token, &test_user(), &fingerprint).await;

        assert!(matches!(
            gate,
            SessionGate::Denied(PlaygroundError::InvalidSessionToken)
        ));
    }

    #[tokio::test]
    async fn test_rotation_after_request_threshold() {
        let repo = Arc::new(MemorySessionRepo::new());
        let config = test_config();
        let guard = SessionGuardUseCase::new(repo.clone(), config.clone());
        let user = test_user();
        let fingerprint = test_fingerprint();

        let ticket = match guard.establish(&user, &fingerprint).await {
            SessionGate::Established(ticket) => ticket,
            other => panic!("expected Established, got {other:?}"),
        };

        let session = repo.only_session().await;
        repo.with_session_mut(session.session_id, |s| {
            s.last_request_at_ms -= 31_000;
            s.request_count = 9; // this request becomes the 10th
        })
        .await;

        let validated = match guard.validate(&ticket.token, &user, &fingerprint).await {
            SessionGate::Validated(ticket) => ticket,
            other => panic!("expected Validated, got {other:?}"),
        };

        assert!(validated.rotated);
        assert_ne!(validated.token, ticket.token);
        assert_eq!(validated.request_count, 10);

        // Old token is gone, replacement is bound to the same user/client
        let replacement = repo.only_session().await;
        assert_ne!(replacement.session_id, session.session_id);
        assert_eq!(replacement.user_id, user.user_id);
        assert_eq!(replacement.fingerprint_hash, fingerprint.hash);
        assert_eq!(replacement.request_count, 0);
        assert_eq!(
            verify_session_token(&validated.token, &config.session_secret),
            Some(replacement.session_id)
        );
    }

    #[tokio::test]
    async fn test_rotation_after_session_age() {
        let repo = Arc::new(MemorySessionRepo::new());
        let guard = SessionGuardUseCase::new(repo.clone(), test_config());
        let user = test_user();
        let fingerprint = test_fingerprint();

        let ticket = match guard.establish(&user, &fingerprint).await {
            SessionGate::Established(ticket) => ticket,
            other => panic!("expected Established, got {other:?}"),
        };

        let session = repo.only_session().await;
        repo.with_session_mut(session.session_id, |s| {
            s.last_request_at_ms -= 31_000;
            s.created_at = s.created_at - chrono::Duration::minutes(16);
        })
        .await;

        let validated = match guard.validate(&ticket.token, &user, &fingerprint).await {
            SessionGate::Validated(ticket) => ticket,
            other => panic!("expected Validated, got {other:?}"),
        };

        assert!(validated.rotated, "old session should rotate on age");
    }

    #[tokio::test]
    async fn test_validation_fails_open_on_store_error() {
        let config = test_config();
        let guard = SessionGuardUseCase::new(Arc::new(FailingSessionRepo), config.clone());

        let token = sign_session_token(Uuid::new_v4(), &config.session_secret);
        let gate = guard
            .validate(&token, &test_user(), &test_fingerprint())
            .await;

        // No error response and no session headers
        assert!(matches!(gate, SessionGate::FailOpen));
    }

    #[tokio::test]
    async fn test_revoke_deletes_all_sessions_for_user() {
        use crate::application::revoke_sessions::RevokeSessionsUseCase;

        let repo = Arc::new(MemorySessionRepo::new());
        let config = test_config();
        let guard = SessionGuardUseCase::new(repo.clone(), config.clone());
        let target = test_user();
        let bystander = test_user();

        for fingerprint in [test_fingerprint(), other_fingerprint()] {
            match guard.establish(&target, &fingerprint).await {
                SessionGate::Established(_) => {}
                other => panic!("expected Established, got {other:?}"),
            }
        }
        match guard.establish(&bystander, &test_fingerprint()).await {
            SessionGate::Established(_) => {}
            other => panic!("expected Established, got {other:?}"),
        }

        let use_case = RevokeSessionsUseCase::new(repo.clone(), config);
        let revoked = use_case.execute(&target.user_id).await.unwrap();

        assert_eq!(revoked, 2);
        assert_eq!(repo.len().await, 1);
        assert_eq!(repo.only_session().await.user_id, bystander.user_id);
    }
}
