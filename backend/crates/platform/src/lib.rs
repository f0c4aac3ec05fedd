//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Cryptographic utilities (SHA-256, HMAC, Base64)
//! - Client identification (request fingerprinting, IP extraction)
//! - Fixed-window rate limiting abstractions

pub mod client;
pub mod crypto;
pub mod rate_limit;
