//! Record Anonymous Usage Use Case
//!
//! Best-effort recording of one anonymous playground run, dispatched after
//! the response is sent. Failures are logged, never surfaced to the client.

use std::sync::Arc;

use crate::application::config::PlaygroundConfig;
use crate::domain::entity::anonymous_usage::AnonymousTracking;
use crate::domain::repository::QuotaRepository;
use crate::error::PlaygroundError;

/// Record usage use case
pub struct RecordUsageUseCase<Q>
where
    Q: QuotaRepository,
{
    quota_repo: Arc<Q>,
    config: Arc<PlaygroundConfig>,
}

impl<Q> RecordUsageUseCase<Q>
where
    Q: QuotaRepository,
{
    pub fn new(quota_repo: Arc<Q>, config: Arc<PlaygroundConfig>) -> Self {
        Self { quota_repo, config }
    }

    /// Record one run against the tracking data captured at gate time
    ///
    /// Never returns an error: recording is not part of the response
    /// contract.
    pub async fn execute(
        &self,
        tracking: AnonymousTracking,
        package_id: Option<String>,
        model: Option<String>,
    ) {
        let result = tokio::time::timeout(
            self.config.store_timeout,
            self.quota_repo
                .record_usage(&tracking, package_id.as_deref(), model.as_deref()),
        )
        .await
        .map_err(|_| PlaygroundError::StoreTimeout)
        .and_then(|r| r);

        match result {
            Ok(recorded) if recorded.success => {
                tracing::debug!(
                    month = %tracking.month,
                    usage_count = recorded.usage_count,
                    "Recorded anonymous playground usage"
                );
            }
            Ok(recorded) => {
                // Lost the race against a concurrent request from the same
                // fingerprint; the store kept the count at the quota cap.
                tracing::warn!(
                    month = %tracking.month,
                    usage_count = recorded.usage_count,
                    "Anonymous usage not recorded: quota already consumed"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to record anonymous playground usage");
            }
        }
    }
}
