//! Anonymous Quota Gate Use Case
//!
//! Decides whether an anonymous request may run the playground this month.

use std::net::IpAddr;
use std::sync::Arc;

use platform::client::{RequestFingerprint, ip_subnet};

use crate::application::config::PlaygroundConfig;
use crate::domain::entity::anonymous_usage::{AnonymousTracking, QuotaStatus};
use crate::domain::repository::QuotaRepository;
use crate::domain::value_object::month::UsageMonth;
use crate::error::{PlaygroundError, PlaygroundResult};

/// Gate outcome
///
/// `Allowed(Some(_))` carries tracking data for the post-response recording
/// hook; `Allowed(None)` means the gate failed open and nothing will be
/// recorded.
#[derive(Debug)]
pub enum QuotaGate {
    Allowed(Option<AnonymousTracking>),
    Denied(PlaygroundError),
}

/// Anonymous quota gate use case
pub struct CheckQuotaUseCase<Q>
where
    Q: QuotaRepository,
{
    quota_repo: Arc<Q>,
    config: Arc<PlaygroundConfig>,
}

impl<Q> CheckQuotaUseCase<Q>
where
    Q: QuotaRepository,
{
    pub fn new(quota_repo: Arc<Q>, config: Arc<PlaygroundConfig>) -> Self {
        Self { quota_repo, config }
    }

    /// Run the gate for one anonymous request
    pub async fn execute(
        &self,
        fingerprint: &RequestFingerprint,
        client_ip: Option<IpAddr>,
    ) -> QuotaGate {
        let month = UsageMonth::current();

        let status = match self.check_with_timeout(&fingerprint.hash, &month).await {
            Ok(status) => status,
            Err(e) => {
                // Never block users because the quota store is down
                tracing::error!(error = %e, "Anonymous quota check failed");
                if self.config.quota_on_backend_error.allows() {
                    return QuotaGate::Allowed(None);
                }
                return QuotaGate::Denied(e);
            }
        };

        if !status.has_quota {
            return QuotaGate::Denied(PlaygroundError::QuotaExceeded {
                quota_limit: self.config.anonymous_quota_limit,
                usage_count: status.usage_count,
                current_month: month.to_string(),
                first_used_at: status.first_used_at,
            });
        }

        let ip = client_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        QuotaGate::Allowed(Some(AnonymousTracking {
            fingerprint_hash: fingerprint.hash.clone(),
            ip_subnet: ip_subnet(&ip),
            client_ip: ip,
            user_agent: fingerprint.user_agent().map(str::to_string),
            month,
        }))
    }

    async fn check_with_timeout(
        &self,
        fingerprint_hash: &str,
        month: &UsageMonth,
    ) -> PlaygroundResult<QuotaStatus> {
        tokio::time::timeout(
            self.config.store_timeout,
            self.quota_repo.check_quota(fingerprint_hash, month),
        )
        .await
        .map_err(|_| PlaygroundError::StoreTimeout)?
    }
}
