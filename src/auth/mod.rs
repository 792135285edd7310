//! Session security and authorization.
//!
//! Login goes through the credential check and lockout tracker, then issues
//! an access token, an optional refresh token and a CSRF token bound to the
//! access token. Every later request runs the authorization pipeline: token
//! shape, revocation, signature and expiry, a fresh principal and tenant
//! lookup, role and ownership rules, and CSRF verification for mutations.

mod cookie;
mod credentials;
mod csrf;
mod errors;
mod ip;
mod lockout;
mod login;
mod middleware;
mod pipeline;
mod principal;
mod revocation;
mod state;
pub mod token_hash;

pub use cookie::{
    ACCESS_COOKIE_NAME, CookiePolicy, REFRESH_COOKIE_NAME, append_cookie, clear_cookie,
    get_cookie,
};
pub use credentials::CredentialVerifier;
pub use csrf::{CSRF_HEADER, CSRF_TTL, CsrfSessionBinding, SessionKey};
pub use errors::{AuthFailure, Denial};
pub use ip::{ClientIp, HasHeadersAndExtensions, extract_client_ip};
pub use lockout::{LOCKOUT_WINDOW, LockoutStatus, LockoutTracker, MAX_FAILED_ATTEMPTS};
pub use login::{LoginFlow, LoginOutcome, RefreshOutcome};
pub use middleware::{
    AccessToken, AllowedRoles, attach_csrf_token, authenticate, csrf_protect, protect,
    require_ownership, require_role,
};
pub use pipeline::{
    ACCESS_TOKEN_HEADER, Authenticated, AuthorizationPipeline, ResourceRefs, authorize_role,
    extract_token,
};
pub use principal::{Principal, TenantRejection, check_tenant};
pub use revocation::{REVOCATION_TTL, RevocationRegistry};
pub use state::{AuthState, HasAuthState};
pub(crate) use credentials::password_matches;
