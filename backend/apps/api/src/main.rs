//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors, but application-level
//! errors should use `kernel::error::AppError`.

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use axum::{
    Router, http,
    http::{Method, header},
};
use base64::Engine;
use base64::engine::general_purpose;
use playground::domain::repository::SessionRepository;
use playground::{
    AuthenticatedUser, InMemoryRateLimitStore, PgPlaygroundRepository, PlaygroundConfig,
    RedisRateLimitStore, playground_router,
};
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

// Re-export unified error types for use in handlers
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,playground=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database connection
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set in environment");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;

    tracing::info!("Migrations completed");

    // Startup cleanup: remove expired playground sessions
    // Errors here should not prevent server startup
    let repo = PgPlaygroundRepository::new(pool.clone());
    match repo.cleanup_expired().await {
        Ok(sessions_deleted) => {
            tracing::info!(sessions_deleted, "Playground session cleanup completed");
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Playground session cleanup failed, continuing anyway"
            );
        }
    }

    // Guard configuration
    let config = if cfg!(debug_assertions) {
        PlaygroundConfig::development()
    } else {
        // In production, load secret from environment
        let secret_b64 = env::var("PLAYGROUND_SESSION_SECRET")
            .expect("PLAYGROUND_SESSION_SECRET must be set in production");
        let secret_bytes = Engine::decode(&general_purpose::STANDARD, &secret_b64)?;
        anyhow::ensure!(
            secret_bytes.len() == 32,
            "PLAYGROUND_SESSION_SECRET must decode to 32 bytes"
        );
        let mut secret = [0u8; 32];
        secret.copy_from_slice(&secret_bytes);
        PlaygroundConfig {
            session_secret: secret,
            ..PlaygroundConfig::default()
        }
    };

    // Counter store: Redis when reachable, in-memory otherwise.
    // The in-memory fallback does not synchronize across processes.
    let guard_router = match env::var("REDIS_URL") {
        Ok(url) => match RedisRateLimitStore::connect(&url).await {
            Ok(store) => {
                tracing::info!("Connected to Redis counter store");
                playground_router(repo, store, config)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Redis unavailable, falling back to in-memory rate limiting"
                );
                playground_router(repo, InMemoryRateLimitStore::new(), config)
            }
        },
        Err(_) => {
            tracing::warn!("REDIS_URL not set, using in-memory rate limiting");
            playground_router(repo, InMemoryRateLimitStore::new(), config)
        }
    };

    // CORS configuration
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]))
        .allow_credentials(true);

    // Build router
    let app = Router::new()
        .nest("/api/playground", guard_router)
        .layer(axum::middleware::from_fn(gateway_identity))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Map the gateway-verified identity headers to an [`AuthenticatedUser`]
///
/// Credential verification happens at the upstream gateway; it strips these
/// headers from client traffic and sets them only after validating the JWT.
/// Absence of the headers means the request is anonymous.
async fn gateway_identity(mut req: Request<Body>, next: Next) -> Response {
    let user_id = req
        .headers()
        .get("x-auth-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<Uuid>().ok());

    if let Some(user_id) = user_id {
        let admin = req
            .headers()
            .get("x-auth-admin")
            .and_then(|v| v.to_str().ok())
            == Some("true");

        req.extensions_mut().insert(AuthenticatedUser {
            user_id: user_id.into(),
            admin,
        });
    }

    next.run(req).await
}
