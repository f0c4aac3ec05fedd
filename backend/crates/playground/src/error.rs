//! Playground Error Types
//!
//! This module provides guard-specific error variants that integrate
//! with the unified `kernel::error::AppError` system. Status codes and
//! machine-readable codes are part of the external contract.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

/// Registration page offered to anonymous clients that ran out of quota
pub const REGISTRATION_URL: &str = "/register";

/// Upgrade page offered to rate-limited users
pub const UPGRADE_URL: &str = "/pricing";

/// Benefits listed in the registration call to action
pub const REGISTRATION_BENEFITS: [&str; 3] = [
    "Unlimited playground runs",
    "Save and share playground sessions",
    "Publish packages to the registry",
];

/// Playground-specific result type alias
pub type PlaygroundResult<T> = Result<T, PlaygroundError>;

/// Playground-specific error variants
///
/// Policy denials carry everything needed to render their contract body;
/// backend failures are resolved to allow/deny by the gates before they
/// ever reach a response.
#[derive(Debug, Error)]
pub enum PlaygroundError {
    /// Anonymous monthly quota exhausted
    #[error("Anonymous playground quota exceeded")]
    QuotaExceeded {
        quota_limit: u32,
        usage_count: i32,
        current_month: String,
        first_used_at: Option<DateTime<Utc>>,
    },

    /// Tiered per-user rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded { limit: u32, retry_after_secs: u64 },

    /// Session used again before the minimum inter-request interval
    #[error("Session rate limit exceeded")]
    SessionRateLimited { retry_after_secs: u64 },

    /// Session fingerprint does not match the one bound at creation
    #[error("Session fingerprint mismatch")]
    FingerprintMismatch,

    /// Session past its expiry timestamp
    #[error("Session expired")]
    SessionExpired,

    /// Malformed or unknown session token
    #[error("Invalid session token")]
    InvalidSessionToken,

    /// A brand-new session could not be persisted
    #[error("Session creation failed")]
    SessionCreationFailed,

    /// Authenticated identity required
    #[error("Authentication required")]
    Unauthenticated,

    /// Admin privileges required
    #[error("Admin privileges required")]
    AdminRequired,

    /// Store call exceeded its bounded timeout
    #[error("Store call timed out")]
    StoreTimeout,

    /// Counter store error
    #[error("Counter store error: {0}")]
    CounterStore(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaygroundError {
    /// True for store/timeout failures that the fail-open policies apply to
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            PlaygroundError::StoreTimeout
                | PlaygroundError::CounterStore(_)
                | PlaygroundError::Database(_)
        )
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            PlaygroundError::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
            PlaygroundError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            PlaygroundError::SessionRateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            PlaygroundError::FingerprintMismatch => StatusCode::FORBIDDEN,
            PlaygroundError::SessionExpired => StatusCode::UNAUTHORIZED,
            PlaygroundError::InvalidSessionToken => StatusCode::BAD_REQUEST,
            PlaygroundError::SessionCreationFailed => StatusCode::INTERNAL_SERVER_ERROR,
            PlaygroundError::Unauthenticated => StatusCode::UNAUTHORIZED,
            PlaygroundError::AdminRequired => StatusCode::FORBIDDEN,
            PlaygroundError::StoreTimeout
            | PlaygroundError::CounterStore(_)
            | PlaygroundError::Database(_)
            | PlaygroundError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code for the body's `error` field
    pub fn code(&self) -> &'static str {
        match self {
            PlaygroundError::QuotaExceeded { .. } => "anonymous_quota_exceeded",
            PlaygroundError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            PlaygroundError::SessionRateLimited { .. } => "session_rate_limit_exceeded",
            PlaygroundError::FingerprintMismatch => "session_validation_failed",
            PlaygroundError::SessionExpired => "session_expired",
            PlaygroundError::InvalidSessionToken => "invalid_session_token",
            PlaygroundError::SessionCreationFailed => "session_creation_failed",
            PlaygroundError::Unauthenticated => "unauthorized",
            PlaygroundError::AdminRequired => "forbidden",
            PlaygroundError::StoreTimeout
            | PlaygroundError::CounterStore(_)
            | PlaygroundError::Database(_)
            | PlaygroundError::Internal(_) => "internal_error",
        }
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlaygroundError::QuotaExceeded { .. }
            | PlaygroundError::FingerprintMismatch
            | PlaygroundError::AdminRequired => ErrorKind::Forbidden,
            PlaygroundError::RateLimitExceeded { .. }
            | PlaygroundError::SessionRateLimited { .. } => ErrorKind::TooManyRequests,
            PlaygroundError::SessionExpired | PlaygroundError::Unauthenticated => {
                ErrorKind::Unauthorized
            }
            PlaygroundError::InvalidSessionToken => ErrorKind::BadRequest,
            PlaygroundError::SessionCreationFailed
            | PlaygroundError::StoreTimeout
            | PlaygroundError::CounterStore(_)
            | PlaygroundError::Database(_)
            | PlaygroundError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Convert to AppError with the full contract body
    pub fn to_app_error(&self) -> AppError {
        let base = AppError::new(self.kind(), self.user_message()).with_code(self.code());

        match self {
            PlaygroundError::QuotaExceeded {
                quota_limit,
                usage_count,
                current_month,
                first_used_at,
            } => base
                .with_details(serde_json::json!({
                    "quotaLimit": quota_limit,
                    "usageCount": usage_count,
                    "currentMonth": current_month,
                    "firstUsedAt": first_used_at,
                }))
                .with_call_to_action(serde_json::json!({
                    "registrationUrl": REGISTRATION_URL,
                    "benefits": REGISTRATION_BENEFITS,
                })),
            PlaygroundError::RateLimitExceeded {
                limit,
                retry_after_secs,
            } => base
                .with_retry_after(*retry_after_secs)
                .with_details(serde_json::json!({ "limit": limit }))
                .with_call_to_action(serde_json::json!({ "upgradeUrl": UPGRADE_URL })),
            PlaygroundError::SessionRateLimited { retry_after_secs } => base
                .with_retry_after(*retry_after_secs)
                .with_details(serde_json::json!({
                    "reason": "Minimum interval between playground requests not met",
                })),
            _ => base,
        }
    }

    fn user_message(&self) -> &'static str {
        match self {
            PlaygroundError::QuotaExceeded { .. } => {
                "Your free playground run for this month has been used. Register for unlimited access."
            }
            PlaygroundError::RateLimitExceeded { .. } => {
                "Too many playground requests. Please slow down or upgrade your plan."
            }
            PlaygroundError::SessionRateLimited { .. } => {
                "Please wait before sending another playground request."
            }
            PlaygroundError::FingerprintMismatch => "Session validation failed",
            PlaygroundError::SessionExpired => "Session expired, request a new one",
            PlaygroundError::InvalidSessionToken => "Invalid session token",
            PlaygroundError::SessionCreationFailed => "Could not create a playground session",
            PlaygroundError::Unauthenticated => "Authentication required",
            PlaygroundError::AdminRequired => "Admin privileges required",
            PlaygroundError::StoreTimeout
            | PlaygroundError::CounterStore(_)
            | PlaygroundError::Database(_)
            | PlaygroundError::Internal(_) => "Internal server error",
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            PlaygroundError::Database(e) => {
                tracing::error!(error = %e, "Playground database error");
            }
            PlaygroundError::CounterStore(msg) => {
                tracing::error!(message = %msg, "Playground counter store error");
            }
            PlaygroundError::StoreTimeout => {
                tracing::error!("Playground store call timed out");
            }
            PlaygroundError::Internal(msg) => {
                tracing::error!(message = %msg, "Playground internal error");
            }
            PlaygroundError::QuotaExceeded { usage_count, .. } => {
                tracing::warn!(usage_count, "Anonymous playground quota exceeded");
            }
            PlaygroundError::RateLimitExceeded { limit, .. } => {
                tracing::warn!(limit, "Playground rate limit exceeded");
            }
            PlaygroundError::FingerprintMismatch => {
                tracing::warn!("Playground session fingerprint mismatch detected");
            }
            _ => {
                tracing::debug!(error = %self, "Playground error");
            }
        }
    }
}

impl IntoResponse for PlaygroundError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}
