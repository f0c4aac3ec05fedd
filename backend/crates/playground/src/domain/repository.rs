//! Repository Traits
//!
//! Interfaces for data persistence. Implementation is in infrastructure layer.
//! Atomicity requirements live here because multiple server processes share
//! the stores: in-process locking is never a substitute.

use kernel::id::UserId;
use uuid::Uuid;

use crate::domain::entity::anonymous_usage::{AnonymousTracking, QuotaStatus, RecordedUsage};
use crate::domain::entity::playground_session::PlaygroundSession;
use crate::domain::value_object::month::UsageMonth;
use crate::domain::value_object::tier::UserTier;
use crate::error::PlaygroundResult;

/// Anonymous quota repository trait
#[trait_variant::make(QuotaRepository: Send)]
pub trait LocalQuotaRepository {
    /// Read quota state for a (fingerprint, month) pair
    async fn check_quota(
        &self,
        fingerprint_hash: &str,
        month: &UsageMonth,
    ) -> PlaygroundResult<QuotaStatus>;

    /// Record one anonymous run
    ///
    /// The store must make this a guarded atomic increment: under
    /// concurrent calls for the same (fingerprint, month), only as many
    /// succeed as the quota allows.
    async fn record_usage(
        &self,
        tracking: &AnonymousTracking,
        package_id: Option<&str>,
        model: Option<&str>,
    ) -> PlaygroundResult<RecordedUsage>;
}

/// Playground session repository trait
#[trait_variant::make(SessionRepository: Send)]
pub trait LocalSessionRepository {
    /// Create a new session
    async fn create(&self, session: &PlaygroundSession) -> PlaygroundResult<()>;

    /// Find session by ID
    async fn find_by_id(&self, session_id: Uuid) -> PlaygroundResult<Option<PlaygroundSession>>;

    /// Atomically count one request against the session if the minimum
    /// inter-request interval has elapsed
    ///
    /// Returns the updated request count, or `None` when the interval gate
    /// rejected the request. Two concurrent calls must not both succeed
    /// inside one interval.
    async fn touch(
        &self,
        session_id: Uuid,
        now_ms: i64,
        min_interval_ms: i64,
    ) -> PlaygroundResult<Option<i32>>;

    /// Replace a session with its rotation successor
    ///
    /// The old token must be unusable once the new one exists.
    async fn replace(
        &self,
        old_session_id: Uuid,
        new_session: &PlaygroundSession,
    ) -> PlaygroundResult<()>;

    /// Delete a session
    async fn delete(&self, session_id: Uuid) -> PlaygroundResult<()>;

    /// Delete all sessions for a user, returning how many were removed
    async fn delete_all_for_user(&self, user_id: &UserId) -> PlaygroundResult<u64>;

    /// Clean up expired sessions
    async fn cleanup_expired(&self) -> PlaygroundResult<u64>;
}

/// Subscription tier lookup trait
#[trait_variant::make(TierRepository: Send)]
pub trait LocalTierRepository {
    /// Resolve the tier for a user from subscription/organization state
    async fn tier_for_user(&self, user_id: &UserId) -> PlaygroundResult<UserTier>;
}
