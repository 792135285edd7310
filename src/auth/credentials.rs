//! Username/password verification.
//!
//! Unknown username, wrong password and disabled user all end in the same
//! `InvalidCredentials`. Tenant problems are only reported once the password
//! has matched.

use std::sync::Arc;

use tracing::{error, warn};

use super::errors::AuthFailure;
use super::principal::{Principal, check_tenant};
use crate::clock::Clock;
use crate::db::{Account, Database};
use crate::password::{DUMMY_HASH, verify_password};

#[derive(Clone)]
pub struct CredentialVerifier {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl CredentialVerifier {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn verify(&self, username: &str, password: &str) -> Result<Principal, AuthFailure> {
        let account = self.lookup(username).await?;
        self.verify_account(account, password).await
    }

    pub async fn lookup(&self, username: &str) -> Result<Option<Account>, AuthFailure> {
        self.db
            .users()
            .find_by_username(username.trim())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to look up user");
                AuthFailure::Internal
            })
    }

    /// Check `password` against an already looked-up account.
    pub async fn verify_account(
        &self,
        account: Option<Account>,
        password: &str,
    ) -> Result<Principal, AuthFailure> {
        let Some(account) = account else {
            password_matches(password, DUMMY_HASH).await?;
            return Err(AuthFailure::InvalidCredentials);
        };

        if !password_matches(password, &account.password_hash).await? {
            return Err(AuthFailure::InvalidCredentials);
        }

        check_tenant(account.role, account.tenant.as_ref(), self.clock.now_secs())?;

        if !account.status {
            return Err(AuthFailure::InvalidCredentials);
        }

        Ok(Principal::from(&account))
    }
}

/// bcrypt is CPU-bound, so it runs off the async workers.
pub(crate) async fn password_matches(password: &str, hash: &str) -> Result<bool, AuthFailure> {
    let password = password.to_owned();
    let hash = hash.to_owned();

    let result = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| {
            error!(error = %e, "Password verification task failed");
            AuthFailure::Internal
        })?;

    match result {
        Ok(matches) => Ok(matches),
        Err(e) => {
            warn!(error = %e, "Stored password hash could not be checked");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::{NewAccount, Role};
    use crate::password::hash_password_with_cost;

    const NOW_SECS: u64 = 1_700_000_000;
    const TENANT: &str = "5e0c2a52-9d0a-4b8e-8e43-1d2f9f3b7a10";

    async fn setup() -> CredentialVerifier {
        let db = Database::open(":memory:").await.unwrap();
        db.tenants()
            .create(TENANT, "Northside", true, None)
            .await
            .unwrap();

        let hash = hash_password_with_cost("P1-correct", 4).unwrap();
        for (id, username, role, tenant_id) in [
            ("u-member", "member", Role::TenantMember, Some(TENANT)),
            ("u-admin", "admin", Role::PlatformAdmin, None),
        ] {
            db.users()
                .create(&NewAccount {
                    id,
                    username,
                    display_name: username,
                    password_hash: &hash,
                    role,
                    tenant_id,
                    job_category_id: None,
                })
                .await
                .unwrap();
        }

        let clock = Arc::new(ManualClock::new(NOW_SECS * 1000));
        CredentialVerifier::new(db, clock)
    }

    #[tokio::test]
    async fn test_correct_credentials() {
        let verifier = setup().await;
        let principal = verifier.verify("member", "P1-correct").await.unwrap();
        assert_eq!(principal.id, "u-member");
        assert_eq!(principal.tenant_id.as_deref(), Some(TENANT));
    }

    #[tokio::test]
    async fn test_unknown_user_and_wrong_password_look_the_same() {
        let verifier = setup().await;
        let unknown = verifier.verify("nobody", "P1-correct").await.unwrap_err();
        let wrong = verifier.verify("member", "nope").await.unwrap_err();

        assert!(matches!(unknown, AuthFailure::InvalidCredentials));
        assert!(matches!(wrong, AuthFailure::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn test_disabled_user_is_generic_failure() {
        let verifier = setup().await;
        verifier.db.users().set_status("u-member", false).await.unwrap();

        let err = verifier.verify("member", "P1-correct").await.unwrap_err();
        assert!(matches!(err, AuthFailure::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_tenant_state_hidden_behind_wrong_password() {
        let verifier = setup().await;
        verifier
            .db
            .tenants()
            .set_status(TENANT, false, None)
            .await
            .unwrap();

        let err = verifier.verify("member", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthFailure::InvalidCredentials));

        let err = verifier.verify("member", "P1-correct").await.unwrap_err();
        assert!(matches!(err, AuthFailure::TenantDisabled));
    }

    #[tokio::test]
    async fn test_expired_subscription() {
        let verifier = setup().await;
        let yesterday = NOW_SECS as i64 - 86_400;
        verifier
            .db
            .tenants()
            .set_status(TENANT, true, Some(yesterday))
            .await
            .unwrap();

        let err = verifier.verify("member", "P1-correct").await.unwrap_err();
        assert!(matches!(err, AuthFailure::SubscriptionExpired));
    }

    #[tokio::test]
    async fn test_admin_has_no_tenant_checks() {
        let verifier = setup().await;
        let principal = verifier.verify("admin", "P1-correct").await.unwrap();
        assert_eq!(principal.role, Role::PlatformAdmin);
    }
}
