//! PostgreSQL Repository Implementations

use chrono::{DateTime, Utc};
use kernel::id::UserId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::anonymous_usage::{AnonymousTracking, QuotaStatus, RecordedUsage};
use crate::domain::entity::playground_session::PlaygroundSession;
use crate::domain::repository::{QuotaRepository, SessionRepository, TierRepository};
use crate::domain::value_object::month::UsageMonth;
use crate::domain::value_object::tier::UserTier;
use crate::error::PlaygroundResult;

/// PostgreSQL-backed repository
#[derive(Clone)]
pub struct PgPlaygroundRepository {
    pool: PgPool,
}

impl PgPlaygroundRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Quota Repository Implementation
// ============================================================================

impl QuotaRepository for PgPlaygroundRepository {
    async fn check_quota(
        &self,
        fingerprint_hash: &str,
        month: &UsageMonth,
    ) -> PlaygroundResult<QuotaStatus> {
        let row = sqlx::query_as::<_, QuotaRow>(
            r#"
            SELECT has_quota, usage_count, first_used_at
            FROM check_anonymous_playground_quota($1, $2)
            "#,
        )
        .bind(fingerprint_hash)
        .bind(month.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(QuotaStatus {
            has_quota: row.has_quota,
            usage_count: row.usage_count,
            first_used_at: row.first_used_at,
        })
    }

    async fn record_usage(
        &self,
        tracking: &AnonymousTracking,
        package_id: Option<&str>,
        model: Option<&str>,
    ) -> PlaygroundResult<RecordedUsage> {
        // The SQL function performs the guarded atomic increment; two
        // concurrent calls for one fingerprint cannot both succeed past
        // the monthly cap.
        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT success, usage_count
            FROM record_anonymous_playground_usage($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&tracking.fingerprint_hash)
        .bind(&tracking.client_ip)
        .bind(&tracking.ip_subnet)
        .bind(tracking.user_agent.as_deref())
        .bind(tracking.month.as_str())
        .bind(package_id)
        .bind(model)
        .fetch_one(&self.pool)
        .await?;

        Ok(RecordedUsage {
            success: row.success,
            usage_count: row.usage_count,
        })
    }
}

// ============================================================================
// Session Repository Implementation
// ============================================================================

impl SessionRepository for PgPlaygroundRepository {
    async fn create(&self, session: &PlaygroundSession) -> PlaygroundResult<()> {
        sqlx::query(
            r#"
            INSERT INTO playground_sessions (
                session_id,
                user_id,
                fingerprint_hash,
                request_count,
                last_request_at_ms,
                expires_at_ms,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(session.session_id)
        .bind(session.user_id.as_uuid())
        .bind(&session.fingerprint_hash)
        .bind(session.request_count)
        .bind(session.last_request_at_ms)
        .bind(session.expires_at_ms)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, session_id: Uuid) -> PlaygroundResult<Option<PlaygroundSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT
                session_id,
                user_id,
                fingerprint_hash,
                request_count,
                last_request_at_ms,
                expires_at_ms,
                created_at
            FROM playground_sessions
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SessionRow::into_session))
    }

    async fn touch(
        &self,
        session_id: Uuid,
        now_ms: i64,
        min_interval_ms: i64,
    ) -> PlaygroundResult<Option<i32>> {
        // Single conditional UPDATE: concurrent requests inside one
        // interval cannot both pass, the row serializes them.
        let row = sqlx::query_as::<_, (i32,)>(
            r#"
            UPDATE playground_sessions
            SET last_request_at_ms = $2, request_count = request_count + 1
            WHERE session_id = $1 AND last_request_at_ms <= $2 - $3
            RETURNING request_count
            "#,
        )
        .bind(session_id)
        .bind(now_ms)
        .bind(min_interval_ms)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(count,)| count))
    }

    async fn replace(
        &self,
        old_session_id: Uuid,
        new_session: &PlaygroundSession,
    ) -> PlaygroundResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM playground_sessions WHERE session_id = $1")
            .bind(old_session_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO playground_sessions (
                session_id,
                user_id,
                fingerprint_hash,
                request_count,
                last_request_at_ms,
                expires_at_ms,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(new_session.session_id)
        .bind(new_session.user_id.as_uuid())
        .bind(&new_session.fingerprint_hash)
        .bind(new_session.request_count)
        .bind(new_session.last_request_at_ms)
        .bind(new_session.expires_at_ms)
        .bind(new_session.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn delete(&self, session_id: Uuid) -> PlaygroundResult<()> {
        sqlx::query("DELETE FROM playground_sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: &UserId) -> PlaygroundResult<u64> {
        let deleted = sqlx::query("DELETE FROM playground_sessions WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted)
    }

    async fn cleanup_expired(&self) -> PlaygroundResult<u64> {
        let now_ms = Utc::now().timestamp_millis();

        let deleted = sqlx::query("DELETE FROM playground_sessions WHERE expires_at_ms < $1")
            .bind(now_ms)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!(sessions_deleted = deleted, "Cleaned up expired playground sessions");

        Ok(deleted)
    }
}

// ============================================================================
// Tier Repository Implementation
// ============================================================================

impl TierRepository for PgPlaygroundRepository {
    async fn tier_for_user(&self, user_id: &UserId) -> PlaygroundResult<UserTier> {
        let code = sqlx::query_scalar::<_, String>(
            r#"
            SELECT CASE
                WHEN EXISTS (
                    SELECT 1
                    FROM organization_members om
                    JOIN organizations o ON o.org_id = om.org_id
                    WHERE om.user_id = $1 AND o.verified
                ) THEN 'verified-org-member'
                WHEN EXISTS (
                    SELECT 1
                    FROM user_subscriptions s
                    WHERE s.user_id = $1
                      AND s.status = 'active'
                      AND (s.expires_at IS NULL OR s.expires_at > now())
                ) THEN 'subscriber'
                ELSE 'free'
            END
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(UserTier::from_code(&code))
    }
}

// Internal row types for sqlx mapping
#[derive(sqlx::FromRow)]
struct QuotaRow {
    has_quota: bool,
    usage_count: i32,
    first_used_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    success: bool,
    usage_count: i32,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: Uuid,
    user_id: Uuid,
    fingerprint_hash: String,
    request_count: i32,
    last_request_at_ms: i64,
    expires_at_ms: i64,
    created_at: DateTime<Utc>,
}

impl SessionRow {
    fn into_session(self) -> PlaygroundSession {
        PlaygroundSession {
            session_id: self.session_id,
            user_id: UserId::from_uuid(self.user_id),
            fingerprint_hash: self.fingerprint_hash,
            request_count: self.request_count,
            last_request_at_ms: self.last_request_at_ms,
            expires_at_ms: self.expires_at_ms,
            created_at: self.created_at,
        }
    }
}
