//! Session Guard Use Case
//!
//! Issues, validates, and rotates playground session tokens bound to the
//! creating client's fingerprint.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use platform::client::RequestFingerprint;

use crate::application::config::PlaygroundConfig;
use crate::domain::entity::playground_session::PlaygroundSession;
use crate::domain::repository::SessionRepository;
use crate::domain::value_object::identity::AuthenticatedUser;
use crate::error::{PlaygroundError, PlaygroundResult};

/// Session state reported back to the client via response headers
#[derive(Debug, Clone)]
pub struct SessionTicket {
    /// Token the client should use from now on
    pub token: String,
    /// Unix timestamp (ms) at which that token expires
    pub expires_at_ms: i64,
    /// Requests validated so far, this one included
    pub request_count: i32,
    /// True when the token was just rotated; clients should switch
    pub rotated: bool,
}

/// Gate outcome
///
/// `FailOpen` lets the request through with no session headers at all:
/// there is no valid session state to report.
#[derive(Debug)]
pub enum SessionGate {
    Established(SessionTicket),
    Validated(SessionTicket),
    Denied(PlaygroundError),
    FailOpen,
}

/// Session guard use case
pub struct SessionGuardUseCase<S>
where
    S: SessionRepository,
{
    session_repo: Arc<S>,
    config: Arc<PlaygroundConfig>,
}

impl<S> SessionGuardUseCase<S>
where
    S: SessionRepository,
{
    pub fn new(session_repo: Arc<S>, config: Arc<PlaygroundConfig>) -> Self {
        Self {
            session_repo,
            config,
        }
    }

    /// Create a session for a first request that carried no token
    ///
    /// The creating request itself is never interval-limited. Creation
    /// fails closed: with no prior trust established, a store failure
    /// rejects the request.
    pub async fn establish(
        &self,
        user: &AuthenticatedUser,
        fingerprint: &RequestFingerprint,
    ) -> SessionGate {
        let session = PlaygroundSession::new(
            user.user_id,
            fingerprint.hash.clone(),
            self.config.session_ttl,
        );

        let created = tokio::time::timeout(
            self.config.store_timeout,
            self.session_repo.create(&session),
        )
        .await
        .map_err(|_| PlaygroundError::StoreTimeout)
        .and_then(|r| r);

        if let Err(e) = created {
            tracing::error!(user_id = %user.user_id, error = %e, "Failed to create playground session");
            if self.config.session_creation_on_backend_error.allows() {
                return SessionGate::FailOpen;
            }
            return SessionGate::Denied(PlaygroundError::SessionCreationFailed);
        }

        tracing::info!(
            user_id = %user.user_id,
            session_id = %session.session_id,
            "Playground session created"
        );

        SessionGate::Established(SessionTicket {
            token: sign_session_token(session.session_id, &self.config.session_secret),
            expires_at_ms: session.expires_at_ms,
            request_count: 0,
            rotated: false,
        })
    }

    /// Validate a supplied token against the current request
    pub async fn validate(
        &self,
        token: &str,
        user: &AuthenticatedUser,
        fingerprint: &RequestFingerprint,
    ) -> SessionGate {
        let Some(session_id) = verify_session_token(token, &self.config.session_secret) else {
            return SessionGate::Denied(PlaygroundError::InvalidSessionToken);
        };

        let session = match self.find_with_timeout(session_id).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %e, "Playground session lookup failed");
                if self.config.session_validation_on_backend_error.allows() {
                    return SessionGate::FailOpen;
                }
                return SessionGate::Denied(PlaygroundError::Internal(
                    "Session validation unavailable".to_string(),
                ));
            }
        };

        let Some(mut session) = session else {
            return SessionGate::Denied(PlaygroundError::InvalidSessionToken);
        };

        if session.user_id != user.user_id {
            tracing::warn!(
                user_id = %user.user_id,
                session_id = %session_id,
                "Playground session token presented by a different user"
            );
            return SessionGate::Denied(PlaygroundError::InvalidSessionToken);
        }

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(session_id).await {
                tracing::warn!(error = %e, "Failed to delete expired playground session");
            }
            return SessionGate::Denied(PlaygroundError::SessionExpired);
        }

        if session.fingerprint_hash != fingerprint.hash {
            // Possible token theft; log with context but never the full token
            tracing::warn!(
                user_id = %user.user_id,
                token_prefix = %token_prefix(token),
                "Playground session fingerprint mismatch"
            );
            return SessionGate::Denied(PlaygroundError::FingerprintMismatch);
        }

        let now_ms = Utc::now().timestamp_millis();

        let touched = tokio::time::timeout(
            self.config.store_timeout,
            self.session_repo
                .touch(session_id, now_ms, self.config.min_interval_ms()),
        )
        .await
        .map_err(|_| PlaygroundError::StoreTimeout)
        .and_then(|r| r);

        let request_count = match touched {
            Ok(Some(count)) => count,
            Ok(None) => {
                let remaining_ms =
                    session.interval_remaining_ms(now_ms, self.config.session_min_interval);
                return SessionGate::Denied(PlaygroundError::SessionRateLimited {
                    retry_after_secs: (((remaining_ms + 999) / 1000).max(1)) as u64,
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Playground session update failed");
                if self.config.session_validation_on_backend_error.allows() {
                    return SessionGate::FailOpen;
                }
                return SessionGate::Denied(PlaygroundError::Internal(
                    "Session validation unavailable".to_string(),
                ));
            }
        };

        session.request_count = request_count;
        session.last_request_at_ms = now_ms;

        // Rotation is advisory: it never fails a request that already
        // passed validation
        if session.needs_rotation(
            now_ms,
            self.config.session_rotation_after_requests,
            self.config.session_rotation_after_age,
        ) {
            if let Some(ticket) = self.try_rotate(&session, request_count).await {
                return SessionGate::Validated(ticket);
            }
        }

        SessionGate::Validated(SessionTicket {
            token: token.to_string(),
            expires_at_ms: session.expires_at_ms,
            request_count,
            rotated: false,
        })
    }

    async fn try_rotate(
        &self,
        session: &PlaygroundSession,
        request_count: i32,
    ) -> Option<SessionTicket> {
        let next = session.rotate(self.config.session_ttl);

        let replaced = tokio::time::timeout(
            self.config.store_timeout,
            self.session_repo.replace(session.session_id, &next),
        )
        .await
        .map_err(|_| PlaygroundError::StoreTimeout)
        .and_then(|r| r);

        match replaced {
            Ok(()) => {
                tracing::info!(
                    user_id = %session.user_id,
                    old_session_id = %session.session_id,
                    new_session_id = %next.session_id,
                    "Playground session token rotated"
                );
                Some(SessionTicket {
                    token: sign_session_token(next.session_id, &self.config.session_secret),
                    expires_at_ms: next.expires_at_ms,
                    request_count,
                    rotated: true,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "Playground session rotation failed, keeping current token");
                None
            }
        }
    }

    async fn find_with_timeout(
        &self,
        session_id: Uuid,
    ) -> PlaygroundResult<Option<PlaygroundSession>> {
        tokio::time::timeout(
            self.config.store_timeout,
            self.session_repo.find_by_id(session_id),
        )
        .await
        .map_err(|_| PlaygroundError::StoreTimeout)?
    }
}

/// Sign a session ID into an opaque token: base64(id || HMAC(id))
pub(crate) fn sign_session_token(session_id: Uuid, secret: &[u8; 32]) -> String {
    let id_bytes = session_id.into_bytes();
    let signature = platform::crypto::hmac_sha256(secret, &id_bytes);

    let mut data = Vec::with_capacity(48);
    data.extend_from_slice(&id_bytes);
    data.extend_from_slice(&signature);
    platform::crypto::to_base64(&data)
}

/// Verify and extract the session ID from a signed token
pub(crate) fn verify_session_token(token: &str, secret: &[u8; 32]) -> Option<Uuid> {
    let token_data = platform::crypto::from_base64(token).ok()?;
    if token_data.len() != 48 {
        // 16 (UUID) + 32 (HMAC)
        return None;
    }

    let id_bytes: [u8; 16] = token_data[0..16].try_into().ok()?;
    let provided_signature: &[u8] = &token_data[16..48];

    let expected_signature = platform::crypto::hmac_sha256(secret, &id_bytes);

    // Constant-time comparison
    if !platform::crypto::constant_time_eq(provided_signature, &expected_signature) {
        return None;
    }

    Some(Uuid::from_bytes(id_bytes))
}

/// Truncated token prefix safe for logs
pub(crate) fn token_prefix(token: &str) -> &str {
    &token[..token.len().min(8)]
}
