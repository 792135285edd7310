mod auth;
mod error;
mod members;
mod submissions;
mod tenants;

use axum::Router;

use crate::auth::AuthState;
use crate::rate_limit::RateLimitConfig;

pub use auth::AuthRoutesState;
pub use error::ApiError;

/// Create the API router.
pub fn create_api_router(
    auth: AuthState,
    no_signup: bool,
    rate_limits: RateLimitConfig,
) -> Router {
    let auth_state = AuthRoutesState {
        auth: auth.clone(),
        no_signup,
        rate_limits,
    };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/tenants", tenants::router(auth.clone()))
        .nest("/members", members::router(auth.clone()))
        .nest("/submissions", submissions::router(auth))
}
