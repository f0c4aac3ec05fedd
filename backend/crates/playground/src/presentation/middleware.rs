//! Guard Middleware
//!
//! The request pipeline: identity is decided once, then the gates run in a
//! fixed order ahead of the business handlers. Gates never propagate errors
//! into handlers; every failure path resolves to an early response or a
//! pass-through.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;

use platform::client::{RequestFingerprint, extract_client_ip};
use platform::rate_limit::RateLimitStore;

use crate::application::check_quota::{CheckQuotaUseCase, QuotaGate};
use crate::application::config::PlaygroundConfig;
use crate::application::rate_limit::{RateLimitDecision, RateLimitGate, TieredRateLimitUseCase};
use crate::application::record_usage::RecordUsageUseCase;
use crate::application::session::{SessionGate, SessionGuardUseCase, SessionTicket};
use crate::domain::repository::{QuotaRepository, SessionRepository, TierRepository};
use crate::domain::value_object::identity::{AuthenticatedUser, RequestIdentity};
use crate::error::PlaygroundError;
use crate::presentation::dto::RunContext;

/// Inbound header carrying the session token
pub const SESSION_TOKEN_HEADER: &str = "x-playground-session";
/// Session expiry (Unix ms) on responses
pub const SESSION_EXPIRES_HEADER: &str = "x-playground-session-expires";
/// Requests counted against the session so far
pub const SESSION_REQUEST_COUNT_HEADER: &str = "x-session-request-count";
/// Set to "true" when the token in X-Playground-Session was just rotated
pub const SESSION_ROTATED_HEADER: &str = "x-session-rotated";
/// Tier ceiling for the current window
pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
/// Requests left in the current window
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
/// Unix timestamp (s) at which the window resets
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Extractor for the identity decided by the pipeline
///
/// Never rejects: a request without a gateway-verified user is anonymous.
impl<St> axum::extract::FromRequestParts<St> for RequestIdentity
where
    St: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &St,
    ) -> Result<Self, Self::Rejection> {
        // The pipeline's decision wins when a guard already ran
        if let Some(identity) = parts.extensions.get::<RequestIdentity>() {
            return Ok(*identity);
        }
        Ok(match parts.extensions.get::<AuthenticatedUser>() {
            Some(user) => RequestIdentity::Authenticated(*user),
            None => RequestIdentity::Anonymous,
        })
    }
}

/// Middleware state
pub struct GuardState<R, S>
where
    R: QuotaRepository + SessionRepository + TierRepository + Clone + Send + Sync + 'static,
    S: RateLimitStore + Clone + Send + Sync + 'static,
{
    pub repo: Arc<R>,
    pub store: Arc<S>,
    pub config: Arc<PlaygroundConfig>,
}

impl<R, S> Clone for GuardState<R, S>
where
    R: QuotaRepository + SessionRepository + TierRepository + Clone + Send + Sync + 'static,
    S: RateLimitStore + Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

/// Full playground guard pipeline
///
/// Authenticated requests: tiered rate limiter, then session gate.
/// Anonymous requests: monthly quota gate, then post-response usage
/// recording when the handler returned 200.
pub async fn playground_guard<R, S>(
    State(state): State<GuardState<R, S>>,
    mut req: Request<Body>,
    next: Next,
) -> Response
where
    R: QuotaRepository + SessionRepository + TierRepository + Clone + Send + Sync + 'static,
    S: RateLimitStore + Clone + Send + Sync + 'static,
{
    let fingerprint = RequestFingerprint::from_headers(req.headers());

    let direct_ip = req
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    let client_ip = extract_client_ip(req.headers(), direct_ip);

    let token = req
        .headers()
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // Identity is decided once here and passed explicitly from this point on
    let identity = match req.extensions().get::<AuthenticatedUser>().copied() {
        Some(user) => RequestIdentity::Authenticated(user),
        None => RequestIdentity::Anonymous,
    };
    req.extensions_mut().insert(identity);

    match identity {
        RequestIdentity::Authenticated(user) => {
            let limiter = TieredRateLimitUseCase::new(
                state.repo.clone(),
                state.store.clone(),
                state.config.clone(),
            );

            let rate_decision = match limiter.execute(&user).await {
                RateLimitGate::Denied(e) => return e.into_response(),
                RateLimitGate::Allowed(decision) => decision,
            };

            let sessions = SessionGuardUseCase::new(state.repo.clone(), state.config.clone());

            let gate = match &token {
                Some(token) => sessions.validate(token, &user, &fingerprint).await,
                None => sessions.establish(&user, &fingerprint).await,
            };

            let ticket = match gate {
                SessionGate::Denied(e) => {
                    let mut response = e.into_response();
                    apply_rate_limit_headers(&mut response, &rate_decision);
                    return response;
                }
                SessionGate::Established(ticket) | SessionGate::Validated(ticket) => Some(ticket),
                SessionGate::FailOpen => None,
            };

            let mut response = next.run(req).await;
            apply_rate_limit_headers(&mut response, &rate_decision);
            if let Some(ticket) = &ticket {
                apply_session_headers(&mut response, ticket);
            }
            response
        }
        RequestIdentity::Anonymous => {
            let gate = CheckQuotaUseCase::new(state.repo.clone(), state.config.clone());

            let tracking = match gate.execute(&fingerprint, client_ip).await {
                QuotaGate::Denied(e) => return e.into_response(),
                QuotaGate::Allowed(tracking) => tracking,
            };

            let response = next.run(req).await;

            // Recording is best-effort and must never delay the response:
            // hand it to a background task and forget it
            if response.status() == StatusCode::OK
                && let Some(tracking) = tracking
            {
                let run_context = response.extensions().get::<RunContext>().cloned();
                let recorder =
                    RecordUsageUseCase::new(state.repo.clone(), state.config.clone());
                tokio::spawn(async move {
                    let (package_id, model) = match run_context {
                        Some(ctx) => (ctx.package_id, ctx.model),
                        None => (None, None),
                    };
                    recorder.execute(tracking, package_id, model).await;
                });
            }

            response
        }
    }
}

/// Purchase-attempt guard: authenticated only, strict tier-independent limit
pub async fn purchase_guard<R, S>(
    State(state): State<GuardState<R, S>>,
    mut req: Request<Body>,
    next: Next,
) -> Response
where
    R: QuotaRepository + SessionRepository + TierRepository + Clone + Send + Sync + 'static,
    S: RateLimitStore + Clone + Send + Sync + 'static,
{
    let Some(user) = req.extensions().get::<AuthenticatedUser>().copied() else {
        return PlaygroundError::Unauthenticated.into_response();
    };
    req.extensions_mut()
        .insert(RequestIdentity::Authenticated(user));

    let limiter = TieredRateLimitUseCase::new(
        state.repo.clone(),
        state.store.clone(),
        state.config.clone(),
    );

    match limiter.execute_purchase(&user).await {
        RateLimitGate::Denied(e) => e.into_response(),
        RateLimitGate::Allowed(decision) => {
            let mut response = next.run(req).await;
            apply_rate_limit_headers(&mut response, &decision);
            response
        }
    }
}

fn apply_rate_limit_headers(response: &mut Response, decision: &Option<RateLimitDecision>) {
    let Some(decision) = decision else {
        // Fail-open: no counter state to report
        return;
    };

    insert_header(
        response,
        RATE_LIMIT_LIMIT_HEADER,
        &decision.limit.to_string(),
    );
    insert_header(
        response,
        RATE_LIMIT_REMAINING_HEADER,
        &decision.remaining.to_string(),
    );
    insert_header(
        response,
        RATE_LIMIT_RESET_HEADER,
        &decision.reset_at_secs.to_string(),
    );
}

fn apply_session_headers(response: &mut Response, ticket: &SessionTicket) {
    insert_header(response, SESSION_TOKEN_HEADER, &ticket.token);
    insert_header(
        response,
        SESSION_EXPIRES_HEADER,
        &ticket.expires_at_ms.to_string(),
    );
    insert_header(
        response,
        SESSION_REQUEST_COUNT_HEADER,
        &ticket.request_count.to_string(),
    );
    if ticket.rotated {
        insert_header(response, SESSION_ROTATED_HEADER, "true");
    }
}

fn insert_header(response: &mut Response, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(name), value);
    }
}
