//! Authentication and authorization failures and their HTTP mapping.

use std::time::Duration;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, append_cookie, clear_cookie};
use super::principal::TenantRejection;
use crate::jwt::TokenError;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

/// Login failures.
///
/// `InvalidCredentials` never says which check failed. The other kinds can only be
/// reached with a correct password, or after the lock has engaged.
#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Too many failed attempts. Try again later")]
    AccountLocked { retry_after: Duration },
    #[error("Tenant is disabled")]
    TenantDisabled,
    #[error("Subscription has expired")]
    SubscriptionExpired,
    #[error("Internal error")]
    Internal,
}

impl AuthFailure {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountLocked { .. } => "ACCOUNT_LOCKED",
            Self::TenantDisabled => "TENANT_DISABLED",
            Self::SubscriptionExpired => "SUBSCRIPTION_EXPIRED",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::AccountLocked { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::TenantDisabled | Self::SubscriptionExpired => StatusCode::FORBIDDEN,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TenantRejection> for AuthFailure {
    fn from(rejection: TenantRejection) -> Self {
        match rejection {
            TenantRejection::Disabled => Self::TenantDisabled,
            TenantRejection::SubscriptionExpired => Self::SubscriptionExpired,
        }
    }
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        // Round up so clients never retry a moment too early
        let retry_after = match &self {
            Self::AccountLocked { retry_after } => {
                Some(retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0))
            }
            _ => None,
        };

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.to_string(),
                code: self.code(),
                retry_after,
            }),
        )
            .into_response();

        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Reasons a request is refused by the authorization pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("Not authenticated")]
    TokenMissing,
    #[error("Malformed token")]
    TokenMalformed,
    #[error("Token has been revoked")]
    TokenRevoked,
    #[error("Invalid token")]
    TokenInvalidSignature,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Wrong token type")]
    TokenWrongType,
    #[error("User not found or disabled")]
    UserNotFoundOrDisabled,
    #[error("Tenant is disabled")]
    TenantDisabled,
    #[error("Subscription has expired")]
    SubscriptionExpired,
    #[error("Insufficient permissions")]
    InsufficientRole,
    #[error("Access to this resource is not allowed")]
    ResourceOwnershipViolation,
    #[error("Invalid resource identifier")]
    InvalidResourceIdFormat,
    #[error("CSRF token missing")]
    CsrfTokenMissing,
    #[error("CSRF token mismatch")]
    CsrfTokenMismatch,
    #[error("Internal error")]
    Internal,
}

impl Denial {
    pub fn code(&self) -> &'static str {
        match self {
            Self::TokenMissing => "TOKEN_MISSING",
            Self::TokenMalformed => "TOKEN_MALFORMED",
            Self::TokenRevoked => "TOKEN_REVOKED",
            Self::TokenInvalidSignature => "TOKEN_INVALID_SIGNATURE",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenWrongType => "TOKEN_WRONG_TYPE",
            Self::UserNotFoundOrDisabled => "USER_NOT_FOUND_OR_DISABLED",
            Self::TenantDisabled => "TENANT_DISABLED",
            Self::SubscriptionExpired => "SUBSCRIPTION_EXPIRED",
            Self::InsufficientRole => "INSUFFICIENT_ROLE",
            Self::ResourceOwnershipViolation => "RESOURCE_OWNERSHIP_VIOLATION",
            Self::InvalidResourceIdFormat => "INVALID_RESOURCE_ID_FORMAT",
            Self::CsrfTokenMissing => "CSRF_TOKEN_MISSING",
            Self::CsrfTokenMismatch => "CSRF_TOKEN_MISMATCH",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::TokenMissing
            | Self::TokenMalformed
            | Self::TokenRevoked
            | Self::TokenInvalidSignature
            | Self::TokenExpired
            | Self::TokenWrongType
            | Self::UserNotFoundOrDisabled => StatusCode::UNAUTHORIZED,
            Self::TenantDisabled
            | Self::SubscriptionExpired
            | Self::InsufficientRole
            | Self::ResourceOwnershipViolation
            | Self::CsrfTokenMissing
            | Self::CsrfTokenMismatch => StatusCode::FORBIDDEN,
            Self::InvalidResourceIdFormat => StatusCode::BAD_REQUEST,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TokenError> for Denial {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Malformed => Self::TokenMalformed,
            TokenError::InvalidSignature => Self::TokenInvalidSignature,
            TokenError::Expired => Self::TokenExpired,
            TokenError::WrongType => Self::TokenWrongType,
            TokenError::Encoding(_) => Self::Internal,
        }
    }
}

impl From<TenantRejection> for Denial {
    fn from(rejection: TenantRejection) -> Self {
        match rejection {
            TenantRejection::Disabled => Self::TenantDisabled,
            TenantRejection::SubscriptionExpired => Self::SubscriptionExpired,
        }
    }
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                code: self.code(),
                retry_after: None,
            }),
        )
            .into_response();

        // Stale credentials are useless to the client, drop them
        if status == StatusCode::UNAUTHORIZED {
            let headers = response.headers_mut();
            append_cookie(headers, &clear_cookie(ACCESS_COOKIE_NAME));
            append_cookie(headers, &clear_cookie(REFRESH_COOKIE_NAME));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_denials_clear_cookies() {
        let response = Denial::TokenExpired.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let cookies: Vec<_> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    }

    #[test]
    fn test_forbidden_denials_keep_cookies() {
        let response = Denial::CsrfTokenMismatch.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Denial::InvalidResourceIdFormat.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Denial::TenantDisabled.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            Denial::UserNotFoundOrDisabled.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_locked_response_has_retry_after() {
        let response = AuthFailure::AccountLocked {
            retry_after: Duration::from_millis(90_500),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "91");
    }
}
