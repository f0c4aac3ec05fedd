//! Playground Router

use axum::{Router, middleware::from_fn_with_state, routing::post};
use std::sync::Arc;

use platform::rate_limit::RateLimitStore;

use crate::application::config::PlaygroundConfig;
use crate::domain::repository::{QuotaRepository, SessionRepository, TierRepository};
use crate::presentation::handlers;
use crate::presentation::middleware::{GuardState, playground_guard, purchase_guard};

/// Create the playground router for any repository/store implementation
pub fn playground_router<R, S>(repo: R, store: S, config: PlaygroundConfig) -> Router
where
    R: QuotaRepository + SessionRepository + TierRepository + Clone + Send + Sync + 'static,
    S: RateLimitStore + Clone + Send + Sync + 'static,
{
    let state = GuardState {
        repo: Arc::new(repo),
        store: Arc::new(store),
        config: Arc::new(config),
    };

    Router::new()
        .route(
            "/run",
            post(handlers::run_playground)
                .layer(from_fn_with_state(state.clone(), playground_guard::<R, S>)),
        )
        .route(
            "/purchase",
            post(handlers::purchase_credits)
                .layer(from_fn_with_state(state.clone(), purchase_guard::<R, S>)),
        )
        .route("/sessions/revoke", post(handlers::revoke_sessions::<R, S>))
        .with_state(state)
}
