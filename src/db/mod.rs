mod submission;
mod tenant;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use submission::{Submission, SubmissionStore};
pub use tenant::{Tenant, TenantStatus, TenantStore};
pub use user::{Account, NewAccount, Role, UserStore};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // Tenants table. subscription_end is a Unix timestamp, NULL = no expiry.
                "CREATE TABLE tenants (
                    id TEXT PRIMARY KEY NOT NULL,
                    name TEXT NOT NULL,
                    enabled INTEGER NOT NULL DEFAULT 1,
                    subscription_end INTEGER,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                // Users table. Platform admins have no tenant.
                "CREATE TABLE users (
                    id TEXT PRIMARY KEY NOT NULL,
                    username TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    display_name TEXT NOT NULL,
                    password_hash TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'TENANT_MEMBER',
                    status INTEGER NOT NULL DEFAULT 1,
                    tenant_id TEXT REFERENCES tenants(id) ON DELETE SET NULL,
                    job_category_id TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_users_username ON users(username)",
                "CREATE INDEX idx_users_tenant_id ON users(tenant_id)",
                // Submissions table, only the ownership columns matter here.
                "CREATE TABLE submissions (
                    id TEXT PRIMARY KEY NOT NULL,
                    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
                    member_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    title TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_submissions_tenant_id ON submissions(tenant_id)",
                "CREATE INDEX idx_submissions_member_id ON submissions(member_id)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the tenant store.
    pub fn tenants(&self) -> TenantStore {
        TenantStore::new(self.pool.clone())
    }

    /// Get the submission store.
    pub fn submissions(&self) -> SubmissionStore {
        SubmissionStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_tenant(db: &Database, id: &str) {
        db.tenants().create(id, "Northside", true, None).await.unwrap();
    }

    fn account<'a>(id: &'a str, username: &'a str, tenant_id: Option<&'a str>) -> NewAccount<'a> {
        NewAccount {
            id,
            username,
            display_name: "Test User",
            password_hash: "hash",
            role: Role::TenantMember,
            tenant_id,
            job_category_id: None,
        }
    }

    #[tokio::test]
    async fn test_migration_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        assert_eq!(db.get_version().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let db = Database::open(":memory:").await.unwrap();
        seed_tenant(&db, "t-1").await;

        db.users()
            .create(&account("u-1", "alice", Some("t-1")))
            .await
            .unwrap();

        let user = db.users().find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(user.id, "u-1");
        assert_eq!(user.role, Role::TenantMember);
        assert!(user.status);
        let tenant = user.tenant.unwrap();
        assert!(tenant.enabled);
        assert_eq!(tenant.subscription_end, None);

        let user = db.users().find_by_id("u-1").await.unwrap().unwrap();
        assert_eq!(user.username, "alice");
    }

    #[tokio::test]
    async fn test_username_lookup_is_case_insensitive() {
        let db = Database::open(":memory:").await.unwrap();
        db.users().create(&account("u-1", "Alice", None)).await.unwrap();

        assert!(db.users().find_by_username("alice").await.unwrap().is_some());
        assert!(db.users().find_by_username("ALICE").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_username_fails() {
        let db = Database::open(":memory:").await.unwrap();
        db.users().create(&account("u-1", "alice", None)).await.unwrap();
        let result = db.users().create(&account("u-2", "alice", None)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_tenant_row_yields_no_snapshot() {
        let db = Database::open(":memory:").await.unwrap();
        db.users().create(&account("u-1", "alice", None)).await.unwrap();

        let user = db.users().find_by_id("u-1").await.unwrap().unwrap();
        assert!(user.tenant_id.is_none());
        assert!(user.tenant.is_none());
    }

    #[tokio::test]
    async fn test_tenant_status_changes_are_visible_through_users() {
        let db = Database::open(":memory:").await.unwrap();
        seed_tenant(&db, "t-1").await;
        db.users()
            .create(&account("u-1", "alice", Some("t-1")))
            .await
            .unwrap();

        assert!(db.tenants().set_status("t-1", false, Some(42)).await.unwrap());

        let status = db.tenants().get_status("t-1").await.unwrap().unwrap();
        assert!(!status.enabled);
        assert_eq!(status.subscription_end, Some(42));

        let user = db.users().find_by_id("u-1").await.unwrap().unwrap();
        assert_eq!(user.tenant, Some(status));
    }

    #[tokio::test]
    async fn test_update_password_hash_and_status() {
        let db = Database::open(":memory:").await.unwrap();
        db.users().create(&account("u-1", "alice", None)).await.unwrap();

        assert!(db.users().update_password_hash("u-1", "new-hash").await.unwrap());
        assert!(db.users().set_status("u-1", false).await.unwrap());
        assert!(!db.users().set_status("missing", false).await.unwrap());

        let user = db.users().find_by_id("u-1").await.unwrap().unwrap();
        assert_eq!(user.password_hash, "new-hash");
        assert!(!user.status);
    }

    #[tokio::test]
    async fn test_submission_owner() {
        let db = Database::open(":memory:").await.unwrap();
        seed_tenant(&db, "t-1").await;
        db.users()
            .create(&account("u-1", "alice", Some("t-1")))
            .await
            .unwrap();
        db.submissions()
            .create("s-1", "t-1", "u-1", "Quarterly report")
            .await
            .unwrap();

        let submission = db.submissions().find("s-1").await.unwrap().unwrap();
        assert_eq!(submission.tenant_id, "t-1");
        assert_eq!(submission.member_id, "u-1");
        assert!(db.submissions().find("s-2").await.unwrap().is_none());
    }
}
