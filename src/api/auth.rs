//! Session endpoints.
//!
//! - POST `/login` - Verify credentials and issue a session
//! - POST `/register` - Self-register a tenant member (unless signups are disabled)
//! - POST `/refresh` - Exchange a refresh token for a new access token
//! - POST `/logout` - Revoke the session's tokens and clear cookies
//! - GET `/me` - Current principal
//! - POST `/password` - Change the current principal's password

use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, info, info_span};

use super::error::{
    ApiError, ResultExt, validate_password, validate_username, validate_uuid,
};
use crate::auth::{
    ACCESS_COOKIE_NAME, AccessToken, AllowedRoles, AuthFailure, AuthState, CSRF_HEADER, ClientIp,
    Denial, Principal, REFRESH_COOKIE_NAME, SessionKey, append_cookie, check_tenant,
    clear_cookie, get_cookie, password_matches, protect,
};
use crate::clock::Clock;
use crate::db::{NewAccount, Role};
use crate::impl_has_auth_state;
use crate::password::hash_password;
use crate::rate_limit::{
    RateLimitConfig, rate_limit_login, rate_limit_refresh, rate_limit_register,
};

#[derive(Clone)]
pub struct AuthRoutesState {
    pub auth: AuthState,
    pub no_signup: bool,
    pub rate_limits: RateLimitConfig,
}

impl_has_auth_state!(AuthRoutesState);

pub fn router(state: AuthRoutesState) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limits.clone(),
            rate_limit_login,
        ));

    let refresh_router = Router::new()
        .route("/refresh", post(refresh))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limits.clone(),
            rate_limit_refresh,
        ));

    let session_router = protect(
        Router::new()
            .route("/logout", post(logout))
            .route("/me", get(me))
            .route("/password", post(change_password)),
        &state.auth,
        AllowedRoles::ANY,
    )
    .with_state(state.clone());

    let router = Router::new()
        .merge(login_router)
        .merge(refresh_router)
        .merge(session_router);

    if state.no_signup {
        router
    } else {
        let register_router = Router::new()
            .route("/register", post(register))
            .with_state(state.clone())
            .layer(middleware::from_fn_with_state(
                state.rate_limits,
                rate_limit_register,
            ));
        router.merge(register_router)
    }
}

fn default_remember_me() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    username: String,
    password: String,
    #[serde(default = "default_remember_me")]
    remember_me: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    principal: Principal,
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    csrf_token: String,
}

fn insert_csrf_header(headers: &mut HeaderMap, token: &str) {
    if let Ok(value) = HeaderValue::from_str(token) {
        headers.insert(CSRF_HEADER, value);
    }
}

async fn login(
    State(state): State<AuthRoutesState>,
    ClientIp(client_ip): ClientIp,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthFailure> {
    let span = info_span!("login", client_ip = client_ip.as_deref().unwrap_or("unknown"));
    let outcome = state
        .auth
        .login
        .login(&payload.username, &payload.password, payload.remember_me)
        .instrument(span)
        .await?;

    let cookies = state.auth.cookies;
    let mut headers = HeaderMap::new();
    append_cookie(
        &mut headers,
        &cookies.set_cookie(
            ACCESS_COOKIE_NAME,
            &outcome.access.token,
            outcome.access.duration,
        ),
    );
    match &outcome.refresh {
        Some(refresh) => append_cookie(
            &mut headers,
            &cookies.set_cookie(REFRESH_COOKIE_NAME, &refresh.token, refresh.duration),
        ),
        None => append_cookie(&mut headers, &clear_cookie(REFRESH_COOKIE_NAME)),
    }
    insert_csrf_header(&mut headers, &outcome.csrf_token);

    Ok((
        headers,
        Json(LoginResponse {
            principal: outcome.principal,
            access_token: outcome.access.token,
            refresh_token: outcome.refresh.map(|t| t.token),
            csrf_token: outcome.csrf_token,
        }),
    ))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenBody {
    refresh_token: Option<String>,
}

/// Refresh token from the JSON body, falling back to the cookie.
fn refresh_token_from(headers: &HeaderMap, body: &Bytes) -> Option<String> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshTokenBody>(body)
            .ok()
            .and_then(|b| b.refresh_token)
    };
    from_body.or_else(|| get_cookie(headers, REFRESH_COOKIE_NAME).map(str::to_owned))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    csrf_token: String,
}

async fn refresh(
    State(state): State<AuthRoutesState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, Denial> {
    let token = refresh_token_from(&headers, &body);
    let outcome = state.auth.login.refresh(token.as_deref()).await?;

    let mut response_headers = HeaderMap::new();
    append_cookie(
        &mut response_headers,
        &state.auth.cookies.set_cookie(
            ACCESS_COOKIE_NAME,
            &outcome.access.token,
            outcome.access.duration,
        ),
    );
    insert_csrf_header(&mut response_headers, &outcome.csrf_token);

    info!(user_id = %outcome.principal.id, "Access token refreshed");
    Ok((
        response_headers,
        Json(RefreshResponse {
            access_token: outcome.access.token,
            csrf_token: outcome.csrf_token,
        }),
    ))
}

async fn logout(
    State(state): State<AuthRoutesState>,
    Extension(AccessToken(token)): Extension<AccessToken>,
    Extension(session): Extension<SessionKey>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let refresh = refresh_token_from(&headers, &body);
    state
        .auth
        .login
        .logout(&token, &session, refresh.as_deref());

    info!(user_id = %principal.id, "User logged out");

    let mut response_headers = HeaderMap::new();
    append_cookie(&mut response_headers, &clear_cookie(ACCESS_COOKIE_NAME));
    append_cookie(&mut response_headers, &clear_cookie(REFRESH_COOKIE_NAME));
    (StatusCode::NO_CONTENT, response_headers)
}

async fn me(Extension(principal): Extension<Principal>) -> Json<Principal> {
    Json(principal)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

async fn change_password(
    State(state): State<AuthRoutesState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    validate_password(&payload.new_password)?;

    let account = state
        .auth
        .db
        .users()
        .find_by_id(&principal.id)
        .await
        .db_err("Failed to load user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let matches = password_matches(&payload.current_password, &account.password_hash)
        .await
        .map_err(|e| ApiError::internal("Failed to verify password", e))?;
    if !matches {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }

    let hash = hash_off_thread(payload.new_password).await?;
    state
        .auth
        .db
        .users()
        .update_password_hash(&principal.id, &hash)
        .await
        .db_err("Failed to update password")?;

    info!(user_id = %principal.id, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    username: String,
    password: String,
    display_name: Option<String>,
    tenant_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    id: String,
    username: String,
}

async fn register(
    State(state): State<AuthRoutesState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = payload.username.trim();
    validate_username(username)?;
    validate_password(&payload.password)?;
    validate_uuid(&payload.tenant_id)?;

    let db = &state.auth.db;
    let tenant = db
        .tenants()
        .get_status(&payload.tenant_id)
        .await
        .db_err("Failed to load tenant")?
        .ok_or_else(|| ApiError::bad_request("Unknown tenant"))?;
    check_tenant(
        Role::TenantMember,
        Some(&tenant),
        state.auth.clock.now_secs(),
    )
    .map_err(|_| ApiError::forbidden("Tenant is not accepting registrations"))?;

    let taken = db
        .users()
        .find_by_username(username)
        .await
        .db_err("Failed to check username availability")?
        .is_some();
    if taken {
        return Err(ApiError::conflict("Username is already taken"));
    }

    let hash = hash_off_thread(payload.password).await?;
    let id = uuid::Uuid::new_v4().to_string();
    let display_name = payload
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(username);

    db.users()
        .create(&NewAccount {
            id: &id,
            username,
            display_name,
            password_hash: &hash,
            role: Role::TenantMember,
            tenant_id: Some(&payload.tenant_id),
            job_category_id: None,
        })
        .await
        .db_err("Failed to create user")?;

    info!(user_id = %id, tenant_id = %payload.tenant_id, "Member registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id,
            username: username.to_string(),
        }),
    ))
}

async fn hash_off_thread(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::internal("Password hashing task failed", e))?
        .map_err(|e| ApiError::internal("Failed to hash password", e))
}
