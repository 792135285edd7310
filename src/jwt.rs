//! Access/refresh token issuing and verification.
//!
//! Expiry is checked against the injected [`Clock`] rather than by
//! `jsonwebtoken`, so tests can step past a token's lifetime.

use std::collections::HashSet;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::Principal;
use crate::clock::Clock;
use crate::db::Role;

/// Upper bound for access token lifetime: 24 hours.
pub const MAX_ACCESS_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// Upper bound for refresh token lifetime: 7 days.
pub const MAX_REFRESH_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Signed claim set. Refresh tokens only carry `sub`, `typ`, `jti`, `iat` and `exp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Principal id
    pub sub: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_category_id: Option<String>,
    /// Unique per token, so two tokens issued in the same second never collide.
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Lifetime in seconds, used for cookie Max-Age
    pub duration: u64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("wrong token type")]
    WrongType,
    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
}

/// Issues and verifies signed tokens with a process-wide secret.
pub struct TokenLifecycle {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl TokenLifecycle {
    pub fn new(secret: &[u8], clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            clock,
            access_ttl_secs: MAX_ACCESS_TOKEN_TTL_SECS,
            refresh_ttl_secs: MAX_REFRESH_TOKEN_TTL_SECS,
        }
    }

    /// Override token lifetimes. Values are clamped to `1..=MAX`.
    pub fn with_ttls(mut self, access_ttl_secs: u64, refresh_ttl_secs: u64) -> Self {
        self.access_ttl_secs = access_ttl_secs.clamp(1, MAX_ACCESS_TOKEN_TTL_SECS);
        self.refresh_ttl_secs = refresh_ttl_secs.clamp(1, MAX_REFRESH_TOKEN_TTL_SECS);
        self
    }

    pub fn access_ttl_secs(&self) -> u64 {
        self.access_ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> u64 {
        self.refresh_ttl_secs
    }

    pub fn issue_access_token(&self, principal: &Principal) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now_secs();
        let claims = Claims {
            sub: principal.id.clone(),
            token_type: TokenType::Access,
            role: Some(principal.role),
            tenant_id: principal.tenant_id.clone(),
            job_category_id: principal.job_category_id.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now + self.access_ttl_secs,
        };
        self.sign(&claims, self.access_ttl_secs)
    }

    pub fn issue_refresh_token(&self, principal: &Principal) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now_secs();
        let claims = Claims {
            sub: principal.id.clone(),
            token_type: TokenType::Refresh,
            role: None,
            tenant_id: None,
            job_category_id: None,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now + self.refresh_ttl_secs,
        };
        self.sign(&claims, self.refresh_ttl_secs)
    }

    fn sign(&self, claims: &Claims, duration: u64) -> Result<IssuedToken, TokenError> {
        let token = jsonwebtoken::encode(&Header::default(), claims, &self.encoding_key)
            .map_err(TokenError::Encoding)?;
        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
            duration,
        })
    }

    /// Verify structure, signature and expiry of any token type.
    ///
    /// The structural check runs before any cryptography.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        if !is_well_formed(token) {
            return Err(TokenError::Malformed);
        }

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_)
                | ErrorKind::InvalidToken => TokenError::Malformed,
                _ => TokenError::InvalidSignature,
            })?;

        if self.clock.now_secs() >= data.claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.token_type != TokenType::Access {
            return Err(TokenError::WrongType);
        }
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(TokenError::WrongType);
        }
        Ok(claims)
    }
}

/// Exactly three non-empty dot-separated segments.
pub fn is_well_formed(token: &str) -> bool {
    let mut segments = 0;
    for segment in token.split('.') {
        if segment.is_empty() {
            return false;
        }
        segments += 1;
    }
    segments == 3
}
