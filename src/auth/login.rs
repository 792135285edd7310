//! Login, refresh and logout flows.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::credentials::CredentialVerifier;
use super::csrf::{CsrfSessionBinding, SessionKey};
use super::errors::{AuthFailure, Denial};
use super::lockout::{LOCKOUT_WINDOW, LockoutTracker};
use super::pipeline::AuthorizationPipeline;
use super::principal::Principal;
use super::revocation::RevocationRegistry;
use crate::jwt::{IssuedToken, TokenLifecycle, is_well_formed};

#[derive(Debug)]
pub struct LoginOutcome {
    pub principal: Principal,
    pub access: IssuedToken,
    pub refresh: Option<IssuedToken>,
    pub csrf_token: String,
}

#[derive(Debug)]
pub struct RefreshOutcome {
    pub principal: Principal,
    pub access: IssuedToken,
    pub csrf_token: String,
}

pub struct LoginFlow {
    credentials: CredentialVerifier,
    lockout: Arc<LockoutTracker>,
    tokens: Arc<TokenLifecycle>,
    revocations: Arc<RevocationRegistry>,
    csrf: Arc<CsrfSessionBinding>,
    pipeline: Arc<AuthorizationPipeline>,
}

impl LoginFlow {
    pub fn new(
        credentials: CredentialVerifier,
        lockout: Arc<LockoutTracker>,
        tokens: Arc<TokenLifecycle>,
        revocations: Arc<RevocationRegistry>,
        csrf: Arc<CsrfSessionBinding>,
        pipeline: Arc<AuthorizationPipeline>,
    ) -> Self {
        Self {
            credentials,
            lockout,
            tokens,
            revocations,
            csrf,
            pipeline,
        }
    }

    /// Verify credentials under the lockout policy and issue a session.
    ///
    /// A locked username is refused before its password is looked at, so even
    /// the correct password is rejected until the window ends.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<LoginOutcome, AuthFailure> {
        let account = self.credentials.lookup(username).await?;
        let role = account.as_ref().map(|a| a.role);

        let status = self.lockout.check_locked(username, role);
        if status.locked {
            warn!(username = %username, "Login refused, account locked");
            return Err(AuthFailure::AccountLocked {
                retry_after: status.remaining.unwrap_or(LOCKOUT_WINDOW),
            });
        }

        let principal = match self.credentials.verify_account(account, password).await {
            Ok(principal) => principal,
            Err(AuthFailure::InvalidCredentials) => {
                let status = self.lockout.record_failure(username, role);
                warn!(username = %username, attempts = status.attempts, "Login failed");
                if status.locked {
                    return Err(AuthFailure::AccountLocked {
                        retry_after: status.remaining.unwrap_or(LOCKOUT_WINDOW),
                    });
                }
                return Err(AuthFailure::InvalidCredentials);
            }
            Err(e) => {
                warn!(username = %username, code = e.code(), "Login refused");
                return Err(e);
            }
        };

        self.lockout.clear(username);

        let access = self.tokens.issue_access_token(&principal).map_err(|e| {
            error!(error = %e, "Failed to issue access token");
            AuthFailure::Internal
        })?;
        let refresh = if remember_me {
            let refresh = self.tokens.issue_refresh_token(&principal).map_err(|e| {
                error!(error = %e, "Failed to issue refresh token");
                AuthFailure::Internal
            })?;
            Some(refresh)
        } else {
            None
        };
        let csrf_token = self
            .csrf
            .issue_for(&SessionKey::from_access_token(&access.token));

        info!(user_id = %principal.id, "User logged in");
        Ok(LoginOutcome {
            principal,
            access,
            refresh,
            csrf_token,
        })
    }

    /// Trade a refresh token for a new access token.
    ///
    /// Role and tenant come from the store, so changes since the refresh
    /// token was issued take effect here.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<RefreshOutcome, Denial> {
        let token = refresh_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(Denial::TokenMissing)?;

        if !is_well_formed(token) {
            return Err(Denial::TokenMalformed);
        }
        if self.revocations.is_revoked(token) {
            return Err(Denial::TokenRevoked);
        }
        let claims = self.tokens.verify_refresh(token)?;
        let principal = self.pipeline.load_principal(&claims.sub).await?;

        let access = self.tokens.issue_access_token(&principal).map_err(|e| {
            error!(error = %e, "Failed to issue access token");
            Denial::Internal
        })?;
        let csrf_token = self
            .csrf
            .issue_for(&SessionKey::from_access_token(&access.token));

        Ok(RefreshOutcome {
            principal,
            access,
            csrf_token,
        })
    }

    /// Revoke the session's tokens and drop its CSRF binding.
    ///
    /// The refresh token is only revoked if it verifies, so arbitrary strings
    /// cannot be used to fill the registry.
    pub fn logout(&self, access_token: &str, session: &SessionKey, refresh_token: Option<&str>) {
        self.revocations.revoke(access_token);
        if let Some(refresh) = refresh_token {
            if self.tokens.verify_refresh(refresh).is_ok() {
                self.revocations.revoke(refresh);
            }
        }
        self.csrf.revoke(session);
    }
}
