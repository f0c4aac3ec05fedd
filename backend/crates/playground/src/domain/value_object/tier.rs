//! User Tier
//!
//! Subscription class that decides the playground request ceiling.

/// Trust tier of an authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserTier {
    /// No active subscription
    #[default]
    Free,
    /// Active individual subscription
    Subscriber,
    /// Member of a verified organization
    VerifiedOrgMember,
}

impl UserTier {
    /// Requests allowed per one-minute window
    pub const fn requests_per_minute(&self) -> u32 {
        match self {
            UserTier::Free => 5,
            UserTier::Subscriber => 20,
            UserTier::VerifiedOrgMember => 100,
        }
    }

    /// Stable string code (matches the tier lookup query output)
    pub const fn code(&self) -> &'static str {
        match self {
            UserTier::Free => "free",
            UserTier::Subscriber => "subscriber",
            UserTier::VerifiedOrgMember => "verified-org-member",
        }
    }

    /// Parse a tier code; unknown codes degrade to the most conservative tier
    pub fn from_code(code: &str) -> Self {
        match code {
            "subscriber" => UserTier::Subscriber,
            "verified-org-member" => UserTier::VerifiedOrgMember,
            _ => UserTier::Free,
        }
    }
}
