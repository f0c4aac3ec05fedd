//! API DTOs (Data Transfer Objects)

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request for POST /api/playground/run
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default)]
    pub package_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Response for POST /api/playground/run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub status: &'static str,
    pub package_id: Option<String>,
    pub model: Option<String>,
}

/// What the run handler actually executed, surfaced to the post-response
/// usage recording hook via a response extension
#[derive(Debug, Clone)]
pub struct RunContext {
    pub package_id: Option<String>,
    pub model: Option<String>,
}

/// Request for POST /api/playground/purchase
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub package_id: String,
}

/// Response for POST /api/playground/purchase
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub status: &'static str,
    pub package_id: String,
}

/// Request for POST /api/playground/sessions/revoke
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    pub user_id: Uuid,
}

/// Response for POST /api/playground/sessions/revoke
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeResponse {
    pub revoked: u64,
}
