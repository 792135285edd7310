//! Anti-forgery tokens bound to an access token's session.

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use subtle::ConstantTimeEq;

use super::token_hash::{Keyspace, hash_token};
use crate::cache::TtlCache;
use crate::clock::Clock;

/// Request and response header carrying the CSRF token.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Sessions expire one hour after the last authenticated GET.
pub const CSRF_TTL: Duration = Duration::from_secs(60 * 60);

/// Pre-authentication or self-authenticating routes.
const EXEMPT_ROUTES: [&str; 3] = [
    "/api/auth/login",
    "/api/auth/register",
    "/api/auth/refresh",
];

/// CSRF session key derived from an access token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn from_access_token(token: &str) -> Self {
        Self(hash_token(Keyspace::Csrf, token))
    }
}

pub struct CsrfSessionBinding {
    sessions: TtlCache<SessionKey, String>,
}

impl CsrfSessionBinding {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: TtlCache::new(clock),
        }
    }

    /// Issue a fresh token for the session, replacing any existing one.
    pub fn issue_for(&self, key: &SessionKey) -> String {
        let token = generate_token();
        self.sessions.insert(key.clone(), token.clone(), CSRF_TTL);
        token
    }

    pub fn get_for(&self, key: &SessionKey) -> Option<String> {
        self.sessions.get(key)
    }

    /// Existing token for the session, or a new one. `true` when issued now.
    pub fn get_or_issue(&self, key: &SessionKey) -> (String, bool) {
        self.sessions
            .get_or_insert_with(key.clone(), CSRF_TTL, generate_token)
    }

    /// Restart the session's TTL. Returns the token if the session is live.
    pub fn touch(&self, key: &SessionKey) -> Option<String> {
        let token = self.sessions.get(key)?;
        self.sessions.insert(key.clone(), token.clone(), CSRF_TTL);
        Some(token)
    }

    /// Constant-time comparison against the session's token.
    pub fn verify(&self, key: &SessionKey, presented: &str) -> bool {
        match self.sessions.get(key) {
            Some(expected) => bool::from(expected.as_bytes().ct_eq(presented.as_bytes())),
            None => false,
        }
    }

    pub fn revoke(&self, key: &SessionKey) {
        self.sessions.remove(key);
    }

    /// Safe methods and the login/register/refresh routes skip verification.
    pub fn is_exempt(method: &Method, path: &str) -> bool {
        if matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS) {
            return true;
        }
        let path = path.trim_end_matches('/');
        EXEMPT_ROUTES.contains(&path)
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
