//! Axum middleware stages for the authorization pipeline.
//!
//! `authenticate` must run first; it puts the [`Principal`], the
//! [`SessionKey`] and the raw [`AccessToken`] into request extensions for the
//! stages after it.

use axum::{
    Router,
    body::Body,
    extract::{FromRequestParts, OriginalUri, Query, RawPathParams, Request, State},
    http::{HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::{error, warn};

use super::csrf::{CSRF_HEADER, CsrfSessionBinding, SessionKey};
use super::errors::Denial;
use super::pipeline::{Authenticated, ResourceRefs, authorize_role, extract_token};
use super::principal::Principal;
use super::state::AuthState;
use super::token_hash::log_key;
use crate::db::Role;

/// Largest JSON body inspected for resource ids.
const MAX_INSPECTED_BODY: usize = 1024 * 1024;

/// The raw access token of an authenticated request.
#[derive(Debug, Clone)]
pub struct AccessToken(pub String);

/// Roles a route accepts.
#[derive(Debug, Clone, Copy)]
pub struct AllowedRoles(pub &'static [Role]);

impl AllowedRoles {
    pub const ANY: Self = Self(&[Role::PlatformAdmin, Role::TenantManager, Role::TenantMember]);
    pub const ADMIN: Self = Self(&[Role::PlatformAdmin]);
    pub const ADMIN_OR_MANAGER: Self = Self(&[Role::PlatformAdmin, Role::TenantManager]);
}

/// Wrap every route of `router` in the full pipeline.
///
/// Stages run as authenticate, attach CSRF token, role, ownership, CSRF
/// verification. The last `route_layer` added runs first.
pub fn protect<S>(router: Router<S>, auth: &AuthState, roles: AllowedRoles) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .route_layer(middleware::from_fn_with_state(auth.clone(), csrf_protect))
        .route_layer(middleware::from_fn_with_state(auth.clone(), require_ownership))
        .route_layer(middleware::from_fn_with_state(roles, require_role))
        .route_layer(middleware::from_fn_with_state(auth.clone(), attach_csrf_token))
        .route_layer(middleware::from_fn_with_state(auth.clone(), authenticate))
}

pub async fn authenticate(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    match auth.pipeline.authenticate(request.headers()).await {
        Ok(Authenticated {
            principal,
            token,
            session,
        }) => {
            let extensions = request.extensions_mut();
            extensions.insert(principal);
            extensions.insert(session);
            extensions.insert(AccessToken(token));
            next.run(request).await
        }
        Err(denial) => deny(&request, denial),
    }
}

/// Lazily issue the session's CSRF token and echo it in `X-CSRF-Token`.
///
/// The header is sent when the token was just issued and on every GET,
/// which also renews the session's TTL.
pub async fn attach_csrf_token(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(session) = request.extensions().get::<SessionKey>().cloned() else {
        return next.run(request).await;
    };
    let is_get = request.method() == Method::GET;

    let (token, created) = auth.csrf.get_or_issue(&session);
    if is_get && !created {
        auth.csrf.touch(&session);
    }

    let mut response = next.run(request).await;
    if created || is_get {
        if let Ok(value) = HeaderValue::from_str(&token) {
            response.headers_mut().insert(CSRF_HEADER, value);
        }
    }
    response
}

pub async fn require_role(
    State(allowed): State<AllowedRoles>,
    request: Request,
    next: Next,
) -> Response {
    let result = match request.extensions().get::<Principal>() {
        Some(principal) => authorize_role(principal, allowed.0),
        None => Err(Denial::TokenMissing),
    };

    match result {
        Ok(()) => next.run(request).await,
        Err(denial) => deny(&request, denial),
    }
}

/// Check every tenant, member and submission id in the path, the query
/// string and the top level of a JSON body.
pub async fn require_ownership(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(principal) = request.extensions().get::<Principal>().cloned() else {
        return deny(&request, Denial::TokenMissing);
    };

    let (request, refs) = match collect_resource_refs(request).await {
        Ok(collected) => collected,
        Err(response) => return response,
    };

    match auth.pipeline.authorize_ownership(&principal, &refs).await {
        Ok(()) => next.run(request).await,
        Err(denial) => deny(&request, denial),
    }
}

/// Mutating requests must echo the session's CSRF token.
pub async fn csrf_protect(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    if CsrfSessionBinding::is_exempt(request.method(), &request_path(&request)) {
        return next.run(request).await;
    }

    let result = {
        let presented = request
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match (request.extensions().get::<SessionKey>(), presented) {
            (None, _) => Err(Denial::TokenMissing),
            (Some(_), None) => Err(Denial::CsrfTokenMissing),
            (Some(session), Some(token)) if auth.csrf.verify(session, token) => Ok(()),
            (Some(_), Some(_)) => Err(Denial::CsrfTokenMismatch),
        }
    };

    match result {
        Ok(()) => next.run(request).await,
        Err(denial) => deny(&request, denial),
    }
}

async fn collect_resource_refs(request: Request) -> Result<(Request, ResourceRefs), Response> {
    let (mut parts, body) = request.into_parts();
    let mut refs = ResourceRefs::default();

    if let Ok(params) = RawPathParams::from_request_parts(&mut parts, &()).await {
        for (name, value) in params.iter() {
            refs.add(name, value);
        }
    }

    if let Ok(Query(pairs)) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri) {
        for (name, value) in &pairs {
            refs.add(name, value);
        }
    }

    let is_json = parts
        .headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_json_content_type);
    if !is_json {
        return Ok((Request::from_parts(parts, body), refs));
    }

    let bytes = axum::body::to_bytes(body, MAX_INSPECTED_BODY)
        .await
        .map_err(|_| (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response())?;

    // Invalid JSON is left for the handler's extractor to reject
    if let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(&bytes) {
        for (name, value) in &fields {
            match value {
                Value::String(s) => refs.add(name, s),
                Value::Number(n) => refs.add(name, &n.to_string()),
                Value::Bool(b) => refs.add(name, &b.to_string()),
                Value::Null | Value::Array(_) | Value::Object(_) => {}
            }
        }
    }

    Ok((Request::from_parts(parts, Body::from(bytes)), refs))
}

/// Same acceptance rule as the `Json` extractor: `application/json` or any
/// `application/*+json`, compared case-insensitively, parameters ignored.
fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    let Some((kind, subtype)) = essence.split_once('/') else {
        return false;
    };
    let subtype = subtype.trim().to_ascii_lowercase();
    kind.trim().eq_ignore_ascii_case("application")
        && (subtype == "json" || subtype.ends_with("+json"))
}

fn request_path(request: &Request) -> String {
    request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.path())
        .unwrap_or_else(|| request.uri().path())
        .to_string()
}

/// Log the denial without any secret and turn it into a response.
fn deny(request: &Request, denial: Denial) -> Response {
    let key = request
        .extensions()
        .get::<AccessToken>()
        .map(|token| log_key(&token.0))
        .or_else(|| extract_token(request.headers()).map(|token| log_key(&token)))
        .unwrap_or_else(|| "-".to_string());
    let path = request_path(request);

    if denial == Denial::Internal {
        error!(method = %request.method(), path = %path, key = %key, "Request failed during authorization");
    } else {
        warn!(
            method = %request.method(),
            path = %path,
            kind = denial.code(),
            key = %key,
            "Request denied"
        );
    }

    denial.into_response()
}
