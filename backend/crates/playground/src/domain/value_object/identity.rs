//! Request Identity
//!
//! Who is making the request, decided once per request at the top of the
//! guard pipeline and passed explicitly to downstream gates.

use kernel::id::UserId;

/// Verified identity forwarded by the gateway after credential checks
///
/// Credential verification itself is out of scope for this service; the
/// upstream gateway inserts this value into request extensions.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub admin: bool,
}

/// Tagged request identity
///
/// Replaces re-deriving "is this user logged in" in every gate: the
/// pipeline decides once and the gates branch on the variant.
#[derive(Debug, Clone, Copy)]
pub enum RequestIdentity {
    Anonymous,
    Authenticated(AuthenticatedUser),
}

impl RequestIdentity {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, RequestIdentity::Authenticated(_))
    }

    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match self {
            RequestIdentity::Authenticated(user) => Some(user),
            RequestIdentity::Anonymous => None,
        }
    }
}
