//! Playground Guard Module
//!
//! Anti-abuse and session-security layer for the registry playground.
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, repository traits
//! - `application/` - Use cases (the gates)
//! - `infra/` - PostgreSQL, Redis, and in-memory implementations
//! - `presentation/` - HTTP handlers, DTOs, middleware pipeline, router
//!
//! ## Security Model
//! - Anonymous clients are recognized by a header-derived fingerprint and
//!   limited to a monthly free-run quota; the check-and-record step is
//!   atomic in the store, never in process memory
//! - Authenticated requests pass a per-user fixed-window rate limit whose
//!   ceiling depends on the subscription tier
//! - Playground sessions are HMAC-signed tokens bound to the creating
//!   client's fingerprint, throttled to one request per 30 s, and rotated
//!   after 10 requests or 15 minutes
//! - Infrastructure failures fail open (quota, rate limit, validation) and
//!   fail closed only for initial session creation

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::config::{FailurePolicy, PlaygroundConfig};
pub use domain::value_object::identity::{AuthenticatedUser, RequestIdentity};
pub use error::{PlaygroundError, PlaygroundResult};
pub use infra::memory::InMemoryRateLimitStore;
pub use infra::postgres::PgPlaygroundRepository;
pub use infra::redis::RedisRateLimitStore;
pub use presentation::router::playground_router;

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

#[cfg(test)]
mod tests;
