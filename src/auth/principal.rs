//! The authenticated identity attached to a request.

use serde::Serialize;

use crate::db::{Account, Role, TenantStatus};

/// Identity snapshot rebuilt from the store on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_category_id: Option<String>,
}

impl From<&Account> for Principal {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            username: account.username.clone(),
            display_name: account.display_name.clone(),
            role: account.role,
            tenant_id: account.tenant_id.clone(),
            job_category_id: account.job_category_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantRejection {
    Disabled,
    SubscriptionExpired,
}

/// Tenant gate for non-admin principals.
///
/// A principal whose tenant is missing counts as disabled. A subscription
/// ending exactly now is still valid.
pub fn check_tenant(
    role: Role,
    tenant: Option<&TenantStatus>,
    now_secs: u64,
) -> Result<(), TenantRejection> {
    if role.is_exempt_from_tenancy_rules() {
        return Ok(());
    }

    let tenant = tenant.ok_or(TenantRejection::Disabled)?;
    if !tenant.enabled {
        return Err(TenantRejection::Disabled);
    }
    match tenant.subscription_end {
        Some(end) if end < now_secs as i64 => Err(TenantRejection::SubscriptionExpired),
        _ => Ok(()),
    }
}
