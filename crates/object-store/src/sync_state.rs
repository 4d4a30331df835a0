//! Singleton values: sync cursor, credential, root id.

use common::{Credential, RemoteObject};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

use crate::database::{Database, CREDENTIAL_KEY, CURSOR_KEY, ROOT_KEY};
use crate::error::{Result, StoreError};
use crate::objects::write_object;

impl Database {
    async fn get_state(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM sync_state WHERE key = ?1")
            .bind(key)
            .fetch_optional(&**self)
            .await?;

        Ok(row.map(|r| r.get("value")))
    }

    /// Read the persisted sync cursor
    ///
    /// Migrations seed the row, so absence means the database was tampered
    /// with.
    pub async fn get_cursor(&self) -> Result<u64> {
        let value = self
            .get_state(CURSOR_KEY)
            .await?
            .ok_or_else(|| StoreError::Corruption("sync cursor row is missing".to_string()))?;

        value
            .parse::<u64>()
            .map_err(|_| StoreError::Corruption(format!("sync cursor {value:?} is not a number")))
    }

    pub async fn set_cursor(&self, cursor: u64) -> Result<()> {
        let mut conn = self.acquire().await?;
        write_state(&mut *conn, CURSOR_KEY, &cursor.to_string()).await
    }

    pub async fn get_credential(&self) -> Result<Credential> {
        let value = self
            .get_state(CREDENTIAL_KEY)
            .await?
            .ok_or_else(|| StoreError::NotFound("credential".to_string()))?;

        serde_json::from_str(&value)
            .map_err(|e| StoreError::Corruption(format!("stored credential: {e}")))
    }

    pub async fn set_credential(&self, credential: &Credential) -> Result<()> {
        let value = serde_json::to_string(credential)?;
        let mut conn = self.acquire().await?;
        write_state(&mut *conn, CREDENTIAL_KEY, &value).await
    }

    /// Store the root folder and remember its id, atomically
    pub async fn set_root(&self, root: &RemoteObject) -> Result<()> {
        let mut tx = self.begin().await?;
        write_object(&mut *tx, root).await?;
        write_state(&mut *tx, ROOT_KEY, &root.id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn root_id(&self) -> Result<String> {
        self.get_state(ROOT_KEY)
            .await?
            .ok_or_else(|| StoreError::NotFound("root id".to_string()))
    }
}

async fn write_state(conn: &mut SqliteConnection, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_state (key, value) VALUES (?1, ?2)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cursor_is_seeded_to_zero() {
        let db = Database::in_memory().await.unwrap();
        assert_eq!(db.get_cursor().await.unwrap(), 0);

        db.set_cursor(1006).await.unwrap();
        assert_eq!(db.get_cursor().await.unwrap(), 1006);
    }

    #[tokio::test]
    async fn test_unparsable_cursor_is_corruption() {
        let db = Database::in_memory().await.unwrap();
        sqlx::query("UPDATE sync_state SET value = 'abc' WHERE key = 'cursor'")
            .execute(&*db)
            .await
            .unwrap();

        assert!(matches!(
            db.get_cursor().await,
            Err(StoreError::Corruption(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_cursor_is_corruption() {
        let db = Database::in_memory().await.unwrap();
        sqlx::query("DELETE FROM sync_state")
            .execute(&*db)
            .await
            .unwrap();

        assert!(matches!(
            db.get_cursor().await,
            Err(StoreError::Corruption(_))
        ));
    }

    #[tokio::test]
    async fn test_credential_lifecycle() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.get_credential().await.unwrap_err().is_not_found());

        let credential = Credential {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            token_type: "Bearer".to_string(),
            expiry: None,
        };
        db.set_credential(&credential).await.unwrap();
        assert_eq!(db.get_credential().await.unwrap(), credential);
    }

    #[tokio::test]
    async fn test_set_root_records_id() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.root_id().await.unwrap_err().is_not_found());

        let root = RemoteObject::folder("0AROOT", "My Drive", Vec::<String>::new());
        db.set_root(&root).await.unwrap();

        assert_eq!(db.root_id().await.unwrap(), "0AROOT");
        assert_eq!(db.get_object("0AROOT").await.unwrap(), Some(root));
    }
}
