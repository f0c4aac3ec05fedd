//! Client identification utilities
//!
//! Common functions for identifying clients via HTTP headers.

use axum::http::{HeaderMap, header};
use std::net::{IpAddr, Ipv4Addr};

use crate::crypto::sha256_hex;

/// Header values a fingerprint is derived from
///
/// Absent headers are normalized to empty strings so that fingerprint
/// generation never fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintComponents {
    pub user_agent: String,
    pub accept_language: String,
    pub accept_encoding: String,
}

impl FingerprintComponents {
    /// Canonical string the digest is computed over
    pub fn canonical(&self) -> String {
        format!(
            "{}|{}|{}",
            self.user_agent, self.accept_language, self.accept_encoding
        )
    }
}

/// Client fingerprint derived from request headers
///
/// Used to recognize returning anonymous clients without cookies and to
/// bind sessions to specific clients. Only the hash is ever persisted.
#[derive(Debug, Clone)]
pub struct RequestFingerprint {
    /// Hex-encoded SHA-256 of the canonical header string
    pub hash: String,
    /// Raw component values (for logging/analytics, never persisted)
    pub components: FingerprintComponents,
}

impl RequestFingerprint {
    /// Derive a fingerprint from request headers
    ///
    /// Pure function of the header map: identical header triples always
    /// produce identical hashes. Missing headers count as empty strings.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let components = FingerprintComponents {
            user_agent: header_str(headers, header::USER_AGENT.as_str()),
            accept_language: header_str(headers, header::ACCEPT_LANGUAGE.as_str()),
            accept_encoding: header_str(headers, header::ACCEPT_ENCODING.as_str()),
        };

        let hash = sha256_hex(components.canonical().as_bytes());

        Self { hash, components }
    }

    /// User-Agent value, if the client sent one
    pub fn user_agent(&self) -> Option<&str> {
        if self.components.user_agent.is_empty() {
            None
        } else {
            Some(&self.components.user_agent)
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Extract client IP address from headers
///
/// Precedence: first entry of X-Forwarded-For, then X-Real-IP, then the
/// direct connection address.
///
/// ## Arguments
/// * `headers` - HTTP request headers
/// * `direct_ip` - Direct connection IP address
///
/// ## Returns
/// The client IP address, or None if not determinable
pub fn extract_client_ip(headers: &HeaderMap, direct_ip: Option<IpAddr>) -> Option<IpAddr> {
    // Check X-Forwarded-For header (first IP in the list)
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first_ip) = xff.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if let Ok(ip) = real_ip.trim().parse::<IpAddr>() {
            return Some(ip);
        }
    }

    direct_ip
}

/// Reduce an IP string to its subnet for abuse analytics
///
/// IPv4 keeps the first three octets (`203.0.113.50` -> `203.0.113.0`);
/// IPv6 keeps the first four colon-groups of the original string followed
/// by `::`. Anything unparseable becomes the literal `"unknown"`.
/// The result is a privacy reduction, not a security boundary.
pub fn ip_subnet(ip: &str) -> String {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            let octets = v4.octets();
            Ipv4Addr::new(octets[0], octets[1], octets[2], 0).to_string()
        }
        Ok(IpAddr::V6(_)) => {
            let groups: Vec<&str> = ip.split(':').take(4).collect();
            format!("{}::", groups.join(":"))
        }
        Err(_) => "unknown".to_string(),
    }
}
