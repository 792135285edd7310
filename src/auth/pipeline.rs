//! Per-request authorization decision.
//!
//! Steps run in a fixed order and the first failure wins:
//! extract token, check its shape, check revocation, verify signature and
//! expiry, reload the principal, check its tenant, then the route's role and
//! ownership rules. CSRF verification is the last stage and lives in the
//! middleware.

use std::sync::Arc;

use axum::http::{HeaderMap, header};
use tracing::error;

use super::cookie::{ACCESS_COOKIE_NAME, get_cookie};
use super::csrf::SessionKey;
use super::errors::Denial;
use super::principal::{Principal, check_tenant};
use super::revocation::RevocationRegistry;
use crate::clock::Clock;
use crate::db::{Database, Role};
use crate::jwt::{Claims, TokenLifecycle, is_well_formed};

/// Custom header checked after `Authorization`.
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// Outcome of a successful authentication.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub principal: Principal,
    pub token: String,
    pub session: SessionKey,
}

pub struct AuthorizationPipeline {
    db: Database,
    clock: Arc<dyn Clock>,
    tokens: Arc<TokenLifecycle>,
    revocations: Arc<RevocationRegistry>,
}

impl AuthorizationPipeline {
    pub fn new(
        db: Database,
        clock: Arc<dyn Clock>,
        tokens: Arc<TokenLifecycle>,
        revocations: Arc<RevocationRegistry>,
    ) -> Self {
        Self {
            db,
            clock,
            tokens,
            revocations,
        }
    }

    /// Authenticate a request from its headers.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Authenticated, Denial> {
        let token = extract_token(headers).ok_or(Denial::TokenMissing)?;
        let claims = self.check_access_token(&token)?;
        let principal = self.load_principal(&claims.sub).await?;

        Ok(Authenticated {
            principal,
            session: SessionKey::from_access_token(&token),
            token,
        })
    }

    /// Shape, revocation, then signature and expiry.
    pub fn check_access_token(&self, token: &str) -> Result<Claims, Denial> {
        if !is_well_formed(token) {
            return Err(Denial::TokenMalformed);
        }
        if self.revocations.is_revoked(token) {
            return Err(Denial::TokenRevoked);
        }
        Ok(self.tokens.verify_access(token)?)
    }

    /// Rebuild the principal from current store data.
    ///
    /// Role and tenant always come from the store, never from token claims.
    pub async fn load_principal(&self, principal_id: &str) -> Result<Principal, Denial> {
        let account = self
            .db
            .users()
            .find_by_id(principal_id)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load principal");
                Denial::Internal
            })?
            .filter(|account| account.status)
            .ok_or(Denial::UserNotFoundOrDisabled)?;

        check_tenant(account.role, account.tenant.as_ref(), self.clock.now_secs())?;

        Ok(Principal::from(&account))
    }

    /// Every referenced tenant, member and submission must belong to the
    /// principal's tenant (managers) or to the principal itself (members).
    pub async fn authorize_ownership(
        &self,
        principal: &Principal,
        refs: &ResourceRefs,
    ) -> Result<(), Denial> {
        refs.validate_format()?;

        if principal.role.is_exempt_from_tenancy_rules() {
            return Ok(());
        }
        let own_tenant = principal.tenant_id.as_deref();

        for tenant_id in &refs.tenant_ids {
            if own_tenant != Some(tenant_id.as_str()) {
                return Err(Denial::ResourceOwnershipViolation);
            }
        }

        for member_id in &refs.member_ids {
            let owned = match principal.role {
                Role::TenantMember => *member_id == principal.id,
                _ => {
                    let member = self.db.users().find_by_id(member_id).await.map_err(|e| {
                        error!(error = %e, "Failed to load member for ownership check");
                        Denial::Internal
                    })?;
                    member.is_some_and(|m| m.tenant_id.as_deref() == own_tenant)
                }
            };
            if !owned {
                return Err(Denial::ResourceOwnershipViolation);
            }
        }

        for submission_id in &refs.submission_ids {
            let submission = self
                .db
                .submissions()
                .find(submission_id)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to load submission for ownership check");
                    Denial::Internal
                })?;
            let owned = submission.is_some_and(|s| match principal.role {
                Role::TenantMember => s.member_id == principal.id,
                _ => own_tenant == Some(s.tenant_id.as_str()),
            });
            if !owned {
                return Err(Denial::ResourceOwnershipViolation);
            }
        }

        Ok(())
    }
}

/// Token from `Authorization: Bearer`, then `X-Access-Token`, then the cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then_some(token)
        });

    let custom = headers
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    [bearer, custom, get_cookie(headers, ACCESS_COOKIE_NAME)]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|token| !token.is_empty())
        .map(str::to_owned)
}

pub fn authorize_role(principal: &Principal, allowed: &[Role]) -> Result<(), Denial> {
    if allowed.contains(&principal.role) {
        Ok(())
    } else {
        Err(Denial::InsufficientRole)
    }
}

/// Resource identifiers referenced by a request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResourceRefs {
    pub tenant_ids: Vec<String>,
    pub member_ids: Vec<String>,
    pub submission_ids: Vec<String>,
}

impl ResourceRefs {
    /// Record `value` if `name` identifies a tenant, member or submission.
    /// Names match regardless of case, `_` and `-`.
    pub fn add(&mut self, name: &str, value: &str) {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        let target = match normalized.as_str() {
            "tenantid" => &mut self.tenant_ids,
            "memberid" => &mut self.member_ids,
            "submissionid" => &mut self.submission_ids,
            _ => return,
        };
        target.push(value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.tenant_ids.is_empty() && self.member_ids.is_empty() && self.submission_ids.is_empty()
    }

    fn validate_format(&self) -> Result<(), Denial> {
        let all_valid = self
            .tenant_ids
            .iter()
            .chain(&self.member_ids)
            .chain(&self.submission_ids)
            .all(|id| uuid::Uuid::parse_str(id).is_ok());

        if all_valid {
            Ok(())
        } else {
            Err(Denial::InvalidResourceIdFormat)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_extract_order() {
        let all = headers(&[
            ("authorization", "Bearer from.bearer.header"),
            ("x-access-token", "from.custom.header"),
            ("cookie", "access_token=from.the.cookie"),
        ]);
        assert_eq!(extract_token(&all).as_deref(), Some("from.bearer.header"));

        let no_bearer = headers(&[
            ("x-access-token", "from.custom.header"),
            ("cookie", "access_token=from.the.cookie"),
        ]);
        assert_eq!(extract_token(&no_bearer).as_deref(), Some("from.custom.header"));

        let cookie_only = headers(&[("cookie", "access_token=from.the.cookie")]);
        assert_eq!(extract_token(&cookie_only).as_deref(), Some("from.the.cookie"));
    }

    #[test]
    fn test_extract_ignores_other_schemes_and_empty_values() {
        let map = headers(&[
            ("authorization", "Basic dXNlcjpwYXNz"),
            ("x-access-token", "  "),
            ("cookie", "access_token=from.the.cookie"),
        ]);
        assert_eq!(extract_token(&map).as_deref(), Some("from.the.cookie"));

        assert_eq!(extract_token(&HeaderMap::new()), None);
        assert_eq!(extract_token(&headers(&[("authorization", "Bearer ")])), None);
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        let map = headers(&[("authorization", "bearer a.b.c")]);
        assert_eq!(extract_token(&map).as_deref(), Some("a.b.c"));
    }

    #[test]
    fn test_resource_ref_names_are_normalized() {
        let mut refs = ResourceRefs::default();
        refs.add("tenant_id", "t1");
        refs.add("tenantId", "t2");
        refs.add("member-id", "m1");
        refs.add("submissionId", "s1");
        refs.add("title", "ignored");

        assert_eq!(refs.tenant_ids, vec!["t1", "t2"]);
        assert_eq!(refs.member_ids, vec!["m1"]);
        assert_eq!(refs.submission_ids, vec!["s1"]);
    }

    #[test]
    fn test_id_format() {
        let mut refs = ResourceRefs::default();
        refs.add("memberId", "6a1f3c8e-2b7d-4e59-9c1a-0f4b8d2e7c35");
        assert_eq!(refs.validate_format(), Ok(()));

        refs.add("memberId", "../../etc/passwd");
        assert_eq!(refs.validate_format(), Err(Denial::InvalidResourceIdFormat));
    }

    #[test]
    fn test_authorize_role() {
        let principal = Principal {
            id: "u".into(),
            username: "u".into(),
            display_name: "u".into(),
            role: Role::TenantMember,
            tenant_id: None,
            job_category_id: None,
        };
        assert_eq!(
            authorize_role(&principal, &[Role::PlatformAdmin, Role::TenantManager]),
            Err(Denial::InsufficientRole)
        );
        assert_eq!(authorize_role(&principal, &[Role::TenantMember]), Ok(()));
    }
}
