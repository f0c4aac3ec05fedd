//! HTTP Handlers
//!
//! Thin handlers behind the guard pipeline. Playground execution itself is
//! delegated to the sandbox service; the guard layer acknowledges the run
//! and surfaces its context for usage recording.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use kernel::id::UserId;
use platform::rate_limit::RateLimitStore;

use crate::application::revoke_sessions::RevokeSessionsUseCase;
use crate::domain::repository::{QuotaRepository, SessionRepository, TierRepository};
use crate::domain::value_object::identity::RequestIdentity;
use crate::error::{PlaygroundError, PlaygroundResult};
use crate::presentation::dto::{
    PurchaseRequest, PurchaseResponse, RevokeRequest, RevokeResponse, RunContext, RunRequest,
    RunResponse,
};
use crate::presentation::middleware::GuardState;

/// POST /api/playground/run
pub async fn run_playground(Json(req): Json<RunRequest>) -> Response {
    let context = RunContext {
        package_id: req.package_id.clone(),
        model: req.model.clone(),
    };

    let mut response = (
        StatusCode::OK,
        Json(RunResponse {
            status: "accepted",
            package_id: req.package_id,
            model: req.model,
        }),
    )
        .into_response();

    // The recording hook reads this after the response is produced
    response.extensions_mut().insert(context);

    response
}

/// POST /api/playground/purchase
pub async fn purchase_credits(Json(req): Json<PurchaseRequest>) -> Json<PurchaseResponse> {
    // Payment processing is owned by the billing service; the guard layer
    // only throttles attempts
    Json(PurchaseResponse {
        status: "accepted",
        package_id: req.package_id,
    })
}

/// POST /api/playground/sessions/revoke
pub async fn revoke_sessions<R, S>(
    State(state): State<GuardState<R, S>>,
    identity: RequestIdentity,
    Json(req): Json<RevokeRequest>,
) -> PlaygroundResult<Json<RevokeResponse>>
where
    R: QuotaRepository + SessionRepository + TierRepository + Clone + Send + Sync + 'static,
    S: RateLimitStore + Clone + Send + Sync + 'static,
{
    let Some(user) = identity.user() else {
        return Err(PlaygroundError::Unauthenticated);
    };
    if !user.admin {
        return Err(PlaygroundError::AdminRequired);
    }

    let use_case = RevokeSessionsUseCase::new(state.repo.clone(), state.config.clone());

    let revoked = use_case.execute(&UserId::from_uuid(req.user_id)).await?;

    Ok(Json(RevokeResponse { revoked }))
}
