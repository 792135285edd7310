use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use super::tenant::TenantStatus;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// Principal role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    PlatformAdmin,
    TenantManager,
    TenantMember,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::PlatformAdmin => "PLATFORM_ADMIN",
            Role::TenantManager => "TENANT_MANAGER",
            Role::TenantMember => "TENANT_MEMBER",
        }
    }

    /// Unknown values fall back to the least privileged role.
    pub fn from_str(s: &str) -> Self {
        match s {
            "PLATFORM_ADMIN" => Role::PlatformAdmin,
            "TENANT_MANAGER" => Role::TenantManager,
            _ => Role::TenantMember,
        }
    }

    /// Platform admins skip lockout and every tenant status check.
    pub fn is_exempt_from_tenancy_rules(self) -> bool {
        matches!(self, Role::PlatformAdmin)
    }
}

/// Stored principal record with its tenant snapshot.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: Role,
    pub status: bool,
    pub tenant_id: Option<String>,
    pub job_category_id: Option<String>,
    /// `None` when the principal has no tenant or the tenant row is gone.
    pub tenant: Option<TenantStatus>,
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: String,
    username: String,
    display_name: String,
    password_hash: String,
    role: String,
    status: i32,
    tenant_id: Option<String>,
    job_category_id: Option<String>,
    tenant_enabled: Option<i32>,
    tenant_subscription_end: Option<i64>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        let tenant = match (&row.tenant_id, row.tenant_enabled) {
            (Some(_), Some(enabled)) => Some(TenantStatus {
                enabled: enabled != 0,
                subscription_end: row.tenant_subscription_end,
            }),
            _ => None,
        };

        Self {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
            password_hash: row.password_hash,
            role: Role::from_str(&row.role),
            status: row.status != 0,
            tenant_id: row.tenant_id,
            job_category_id: row.job_category_id,
            tenant,
        }
    }
}

/// Fields for creating a principal.
#[derive(Debug, Clone)]
pub struct NewAccount<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub display_name: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub tenant_id: Option<&'a str>,
    pub job_category_id: Option<&'a str>,
}

const SELECT_ACCOUNT: &str = "SELECT u.id, u.username, u.display_name, u.password_hash, u.role, u.status,
        u.tenant_id, u.job_category_id,
        t.enabled AS tenant_enabled, t.subscription_end AS tenant_subscription_end
    FROM users u
    LEFT JOIN tenants t ON t.id = u.tenant_id";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an enabled principal.
    pub async fn create(&self, account: &NewAccount<'_>) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (id, username, display_name, password_hash, role, status, tenant_id, job_category_id)
             VALUES (?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(account.id)
        .bind(account.username)
        .bind(account.display_name)
        .bind(account.password_hash)
        .bind(account.role.as_str())
        .bind(account.tenant_id)
        .bind(account.job_category_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Look up a principal by username (case-insensitive).
    pub async fn find_by_username(&self, username: &str) -> Result<Option<Account>, sqlx::Error> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("{SELECT_ACCOUNT} WHERE u.username = ?"))
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Account::from))
    }

    /// Look up a principal by id, including current status and tenant snapshot.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Account>, sqlx::Error> {
        let row: Option<AccountRow> = sqlx::query_as(&format!("{SELECT_ACCOUNT} WHERE u.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Account::from))
    }

    pub async fn update_password_hash(&self, id: &str, hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Enable or disable a principal.
    pub async fn set_status(&self, id: &str, status: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET status = ? WHERE id = ?")
            .bind(status as i32)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the role for a principal.
    pub async fn set_role(&self, id: &str, role: Role) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
