//! Anonymous Usage Entities
//!
//! Quota state for anonymous playground clients, keyed by
//! (fingerprint hash, calendar month). Rows roll over naturally at month
//! boundaries; nothing is ever deleted on the request path.

use chrono::{DateTime, Utc};

use crate::domain::value_object::month::UsageMonth;

/// Result of a quota check for one (fingerprint, month) pair
#[derive(Debug, Clone)]
pub struct QuotaStatus {
    /// Whether a free run is still available this month
    pub has_quota: bool,
    /// Runs already consumed this month
    pub usage_count: i32,
    /// First run this month, if any
    pub first_used_at: Option<DateTime<Utc>>,
}

/// Result of recording one anonymous run
#[derive(Debug, Clone)]
pub struct RecordedUsage {
    /// False when the store refused the increment (quota already consumed)
    pub success: bool,
    /// Usage count after the attempt
    pub usage_count: i32,
}

/// Tracking data attached to an allowed anonymous request
///
/// Captured at gate time and handed to the post-response recording task.
/// Holds only the fingerprint hash, never raw header values beyond the
/// user agent kept for abuse analytics.
#[derive(Debug, Clone)]
pub struct AnonymousTracking {
    pub fingerprint_hash: String,
    pub client_ip: String,
    pub ip_subnet: String,
    pub user_agent: Option<String>,
    pub month: UsageMonth,
}
