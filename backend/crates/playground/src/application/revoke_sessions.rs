//! Revoke Sessions Use Case
//!
//! Admin action: invalidate every playground session of a target user.

use std::sync::Arc;

use kernel::id::UserId;

use crate::application::config::PlaygroundConfig;
use crate::domain::repository::SessionRepository;
use crate::error::{PlaygroundError, PlaygroundResult};

/// Revoke sessions use case
pub struct RevokeSessionsUseCase<S>
where
    S: SessionRepository,
{
    session_repo: Arc<S>,
    config: Arc<PlaygroundConfig>,
}

impl<S> RevokeSessionsUseCase<S>
where
    S: SessionRepository,
{
    pub fn new(session_repo: Arc<S>, config: Arc<PlaygroundConfig>) -> Self {
        Self {
            session_repo,
            config,
        }
    }

    /// Delete all sessions for the target user, returning the count
    ///
    /// Unlike the request gates this is an explicit admin operation:
    /// store failures surface as errors instead of failing open.
    pub async fn execute(&self, target: &UserId) -> PlaygroundResult<u64> {
        let revoked = tokio::time::timeout(
            self.config.store_timeout,
            self.session_repo.delete_all_for_user(target),
        )
        .await
        .map_err(|_| PlaygroundError::StoreTimeout)
        .and_then(|r| r)?;

        tracing::info!(user_id = %target, revoked, "Revoked playground sessions");

        Ok(revoked)
    }
}
