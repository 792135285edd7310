//! Auth cookie parsing and the attributes used when setting them.

use axum::http::{HeaderMap, HeaderValue, header};

use crate::cli::Environment;

pub const ACCESS_COOKIE_NAME: &str = "access_token";

pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Cookie attributes per deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    production: bool,
}

impl CookiePolicy {
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            production: environment == Environment::Production,
        }
    }

    /// `Set-Cookie` value with `Max-Age` matching the token lifetime.
    pub fn set_cookie(&self, name: &str, value: &str, max_age_secs: u64) -> String {
        let attributes = if self.production {
            "HttpOnly; Secure; SameSite=Strict"
        } else {
            "SameSite=Lax"
        };
        format!("{name}={value}; {attributes}; Path=/; Max-Age={max_age_secs}")
    }
}

/// `Set-Cookie` value that removes the cookie.
pub fn clear_cookie(name: &str) -> String {
    format!("{name}=; Path=/; Max-Age=0")
}

pub fn append_cookie(headers: &mut HeaderMap, cookie: &str) {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        headers.append(header::SET_COOKIE, value);
    }
}
