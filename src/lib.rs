pub mod api;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod db;
pub mod jwt;
pub mod password;
pub mod rate_limit;

use api::create_api_router;
use auth::{AuthState, CookiePolicy};
use axum::Router;
use clock::Clock;
use db::Database;
use jwt::TokenLifecycle;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Controls cookie attributes
    pub environment: cli::Environment,
    /// Access token lifetime, capped at 24 hours
    pub access_token_ttl_secs: u64,
    /// Refresh token lifetime, capped at 7 days
    pub refresh_token_ttl_secs: u64,
    /// Whether self-registration is disabled
    pub no_signup: bool,
    /// Where the client IP is read from
    pub client_ip_source: cli::ClientIpSource,
    /// Per-IP limits on the unauthenticated auth endpoints
    pub rate_limits: RateLimitConfig,
    /// Time source for every TTL and expiry check
    pub clock: Arc<dyn Clock>,
}

/// Build the shared authentication state for a configuration.
pub fn build_auth_state(config: &ServerConfig) -> AuthState {
    let tokens = TokenLifecycle::new(&config.jwt_secret, config.clock.clone())
        .with_ttls(config.access_token_ttl_secs, config.refresh_token_ttl_secs);

    AuthState::new(
        config.db.clone(),
        config.clock.clone(),
        tokens,
        CookiePolicy::for_environment(config.environment),
        config.client_ip_source,
    )
}

/// Create the application router around an existing auth state.
pub fn create_router(auth: AuthState, config: &ServerConfig) -> Router {
    Router::new().nest(
        "/api",
        create_api_router(auth, config.no_signup, config.rate_limits.clone()),
    )
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    create_router(build_auth_state(config), config)
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
