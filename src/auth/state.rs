//! Shared authentication state and the trait route states implement.

use std::sync::Arc;

use super::cookie::CookiePolicy;
use super::credentials::CredentialVerifier;
use super::csrf::CsrfSessionBinding;
use super::lockout::LockoutTracker;
use super::login::LoginFlow;
use super::pipeline::AuthorizationPipeline;
use super::revocation::RevocationRegistry;
use crate::cli::ClientIpSource;
use crate::clock::Clock;
use crate::db::Database;
use crate::jwt::TokenLifecycle;

/// Every component holding session state, wired to one clock and store.
#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub clock: Arc<dyn Clock>,
    pub tokens: Arc<TokenLifecycle>,
    pub revocations: Arc<RevocationRegistry>,
    pub csrf: Arc<CsrfSessionBinding>,
    pub lockout: Arc<LockoutTracker>,
    pub credentials: CredentialVerifier,
    pub pipeline: Arc<AuthorizationPipeline>,
    pub login: Arc<LoginFlow>,
    pub cookies: CookiePolicy,
    pub client_ip_source: ClientIpSource,
}

impl AuthState {
    pub fn new(
        db: Database,
        clock: Arc<dyn Clock>,
        tokens: TokenLifecycle,
        cookies: CookiePolicy,
        client_ip_source: ClientIpSource,
    ) -> Self {
        let tokens = Arc::new(tokens);
        let revocations = Arc::new(RevocationRegistry::new(clock.clone()));
        let csrf = Arc::new(CsrfSessionBinding::new(clock.clone()));
        let lockout = Arc::new(LockoutTracker::new(clock.clone()));
        let credentials = CredentialVerifier::new(db.clone(), clock.clone());
        let pipeline = Arc::new(AuthorizationPipeline::new(
            db.clone(),
            clock.clone(),
            tokens.clone(),
            revocations.clone(),
        ));
        let login = Arc::new(LoginFlow::new(
            credentials.clone(),
            lockout.clone(),
            tokens.clone(),
            revocations.clone(),
            csrf.clone(),
            pipeline.clone(),
        ));

        Self {
            db,
            clock,
            tokens,
            revocations,
            csrf,
            lockout,
            credentials,
            pipeline,
            login,
            cookies,
            client_ip_source,
        }
    }
}

/// Trait for route state types that carry an [`AuthState`].
pub trait HasAuthState {
    fn auth(&self) -> &AuthState;
}

impl HasAuthState for AuthState {
    fn auth(&self) -> &AuthState {
        self
    }
}

/// Implement `HasAuthState` for a state struct with an `auth: AuthState` field.
///
/// # Example
/// ```ignore
/// #[derive(Clone)]
/// pub struct AuthRoutesState {
///     pub auth: AuthState,
///     pub no_signup: bool,
/// }
///
/// impl_has_auth_state!(AuthRoutesState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_state {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthState for $state_type {
            fn auth(&self) -> &$crate::auth::AuthState {
                &self.auth
            }
        }
    };
}
