use serde::Serialize;
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct TenantStore {
    pool: SqlitePool,
}

/// The parts of a tenant that gate its principals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantStatus {
    pub enabled: bool,
    /// Unix timestamp (seconds); `None` means the subscription never ends.
    pub subscription_end: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub subscription_end: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct TenantRow {
    id: String,
    name: String,
    enabled: i32,
    subscription_end: Option<i64>,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            enabled: row.enabled != 0,
            subscription_end: row.subscription_end,
        }
    }
}

impl TenantStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        id: &str,
        name: &str,
        enabled: bool,
        subscription_end: Option<i64>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO tenants (id, name, enabled, subscription_end) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(enabled as i32)
            .bind(subscription_end)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Tenant>, sqlx::Error> {
        let row: Option<TenantRow> =
            sqlx::query_as("SELECT id, name, enabled, subscription_end FROM tenants WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Tenant::from))
    }

    pub async fn get_status(&self, id: &str) -> Result<Option<TenantStatus>, sqlx::Error> {
        Ok(self.get(id).await?.map(|tenant| TenantStatus {
            enabled: tenant.enabled,
            subscription_end: tenant.subscription_end,
        }))
    }

    /// Enable/disable a tenant and set its subscription end.
    pub async fn set_status(
        &self,
        id: &str,
        enabled: bool,
        subscription_end: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE tenants SET enabled = ?, subscription_end = ? WHERE id = ?")
            .bind(enabled as i32)
            .bind(subscription_end)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
