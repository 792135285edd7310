use serde::Serialize;
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct SubmissionStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub tenant_id: String,
    pub member_id: String,
    pub title: String,
}

impl SubmissionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        id: &str,
        tenant_id: &str,
        member_id: &str,
        title: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO submissions (id, tenant_id, member_id, title) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(tenant_id)
            .bind(member_id)
            .bind(title)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find(&self, id: &str) -> Result<Option<Submission>, sqlx::Error> {
        sqlx::query_as("SELECT id, tenant_id, member_id, title FROM submissions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }
}
