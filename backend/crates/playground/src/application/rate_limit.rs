//! Tiered Rate Limiter Use Case
//!
//! Per-user fixed-window request ceilings that vary by subscription tier,
//! plus the stricter tier-independent purchase-attempt variant.

use std::sync::Arc;

use chrono::Utc;
use platform::rate_limit::{RateLimitConfig, RateLimitStore};

use crate::application::config::PlaygroundConfig;
use crate::domain::repository::TierRepository;
use crate::domain::value_object::identity::AuthenticatedUser;
use crate::domain::value_object::tier::UserTier;
use crate::error::PlaygroundError;

/// Values for the X-RateLimit-* response headers
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_secs: i64,
}

/// Gate outcome
///
/// `Allowed(None)` means the counter store failed and the gate failed open;
/// no headers are emitted in that case.
#[derive(Debug)]
pub enum RateLimitGate {
    Allowed(Option<RateLimitDecision>),
    Denied(PlaygroundError),
}

/// Tiered rate limiter use case
pub struct TieredRateLimitUseCase<T, S>
where
    T: TierRepository,
    S: RateLimitStore,
{
    tier_repo: Arc<T>,
    store: Arc<S>,
    config: Arc<PlaygroundConfig>,
}

impl<T, S> TieredRateLimitUseCase<T, S>
where
    T: TierRepository,
    S: RateLimitStore,
{
    pub fn new(tier_repo: Arc<T>, store: Arc<S>, config: Arc<PlaygroundConfig>) -> Self {
        Self {
            tier_repo,
            store,
            config,
        }
    }

    /// Apply the playground ceiling for this user's tier
    pub async fn execute(&self, user: &AuthenticatedUser) -> RateLimitGate {
        let tier = self.lookup_tier(user).await;

        let key = format!("ratelimit:playground:{}", user.user_id);
        let limit = RateLimitConfig {
            max_requests: tier.requests_per_minute(),
            window: self.config.rate_limit_window,
        };

        self.apply(&key, &limit).await
    }

    /// Apply the tier-independent purchase-attempt ceiling
    pub async fn execute_purchase(&self, user: &AuthenticatedUser) -> RateLimitGate {
        let key = format!("ratelimit:purchase:{}", user.user_id);
        let limit = RateLimitConfig {
            max_requests: self.config.purchase_max_requests,
            window: self.config.rate_limit_window,
        };

        self.apply(&key, &limit).await
    }

    /// Tier lookup; any failure degrades to the most conservative tier
    async fn lookup_tier(&self, user: &AuthenticatedUser) -> UserTier {
        let lookup = tokio::time::timeout(
            self.config.store_timeout,
            self.tier_repo.tier_for_user(&user.user_id),
        )
        .await;

        match lookup {
            Ok(Ok(tier)) => tier,
            Ok(Err(e)) => {
                tracing::warn!(user_id = %user.user_id, error = %e, "Tier lookup failed, treating as free tier");
                UserTier::Free
            }
            Err(_) => {
                tracing::warn!(user_id = %user.user_id, "Tier lookup timed out, treating as free tier");
                UserTier::Free
            }
        }
    }

    async fn apply(&self, key: &str, limit: &RateLimitConfig) -> RateLimitGate {
        let result = tokio::time::timeout(
            self.config.store_timeout,
            self.store.check_and_increment(key, limit),
        )
        .await;

        let result = match result {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                // Rate limiting must never be the reason a legitimate
                // request is dropped during an infrastructure failure
                tracing::error!(key, error = %e, "Rate limit store error");
                if self.config.rate_limit_on_backend_error.allows() {
                    return RateLimitGate::Allowed(None);
                }
                return RateLimitGate::Denied(PlaygroundError::CounterStore(e.to_string()));
            }
            Err(_) => {
                tracing::error!(key, "Rate limit store timed out");
                if self.config.rate_limit_on_backend_error.allows() {
                    return RateLimitGate::Allowed(None);
                }
                return RateLimitGate::Denied(PlaygroundError::StoreTimeout);
            }
        };

        if !result.allowed {
            let now_ms = Utc::now().timestamp_millis();
            return RateLimitGate::Denied(PlaygroundError::RateLimitExceeded {
                limit: limit.max_requests,
                retry_after_secs: result.retry_after_secs(now_ms),
            });
        }

        RateLimitGate::Allowed(Some(RateLimitDecision {
            limit: limit.max_requests,
            remaining: result.remaining,
            reset_at_secs: result.reset_at_secs(),
        }))
    }
}
