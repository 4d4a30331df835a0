//! SQLite connection pool for the metadata cache.
//!
//! Three tables back the cache:
//!
//! - `objects`: one row per remote file or folder
//! - `object_parents`: one row per (parent, child) link; both the parents of
//!   an object and the children of a folder are read from here, so the two
//!   directions can never disagree
//! - `sync_state`: singleton values (cursor, credential, root id)

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use tracing::info;

use crate::error::Result;

/// Key of the sync cursor row in `sync_state`
pub(crate) const CURSOR_KEY: &str = "cursor";
/// Key of the persisted credential row in `sync_state`
pub(crate) const CREDENTIAL_KEY: &str = "credential";
/// Key of the root folder id row in `sync_state`
pub(crate) const ROOT_KEY: &str = "root_id";

/// Database connection pool for the metadata cache.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl std::ops::Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl Database {
    /// Open (or create) a file-based database and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        info!(path = ?path, "metadata cache opened");
        Ok(db)
    }

    /// Create a new in-memory database.
    ///
    /// A single connection that is never recycled, since every connection to
    /// `:memory:` sees its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Create tables and seed singleton rows. Idempotent.
    pub(crate) async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS objects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                is_dir INTEGER NOT NULL,
                size INTEGER NOT NULL,
                last_modified INTEGER NOT NULL,
                download_ref TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // No foreign key on either column: a removed folder's children keep
        // their link rows.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS object_parents (
                parent_id TEXT NOT NULL,
                child_id TEXT NOT NULL,
                PRIMARY KEY (parent_id, child_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_object_parents_child ON object_parents(child_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO sync_state (key, value) VALUES (?1, '0')")
            .bind(CURSOR_KEY)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Number of stored objects.
    pub async fn object_count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM objects")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("count") as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::in_memory().await.unwrap();
        assert_eq!(db.object_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::in_memory().await.unwrap();
        sqlx::query("UPDATE sync_state SET value = '42' WHERE key = 'cursor'")
            .execute(&*db)
            .await
            .unwrap();

        db.run_migrations().await.unwrap();

        let value: String = sqlx::query("SELECT value FROM sync_state WHERE key = 'cursor'")
            .fetch_one(&*db)
            .await
            .unwrap()
            .get("value");
        assert_eq!(value, "42");
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");

        let db = Database::new(&path).await.unwrap();
        assert!(path.exists());
        db.close().await;
    }
}
