//! Object and parent-link queries.

use chrono::{DateTime, Utc};
use common::RemoteObject;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use crate::database::Database;
use crate::error::{Result, StoreError};

/// Object columns plus the JSON array of parent ids, read in one statement.
const SELECT_OBJECT: &str = r#"
    SELECT
        o.id,
        o.name,
        o.is_dir,
        o.size,
        o.last_modified,
        o.download_ref,
        (
            SELECT json_group_array(pp.parent_id)
            FROM object_parents pp
            WHERE pp.child_id = o.id
        ) AS parents
    FROM objects o
"#;

impl Database {
    /// Get an object by id
    pub async fn get_object(&self, id: &str) -> Result<Option<RemoteObject>> {
        let sql = format!("{SELECT_OBJECT} WHERE o.id = ?1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&**self).await?;

        row.as_ref().map(row_to_object).transpose()
    }

    /// List the objects linked below `parent_id`, ordered by name
    pub async fn list_children(&self, parent_id: &str) -> Result<Vec<RemoteObject>> {
        let sql = format!(
            "{SELECT_OBJECT} JOIN object_parents p ON p.child_id = o.id \
             WHERE p.parent_id = ?1 ORDER BY o.name, o.id"
        );
        let rows = sqlx::query(&sql).bind(parent_id).fetch_all(&**self).await?;

        rows.iter().map(row_to_object).collect()
    }

    /// Find a child of `parent_id` by exact name
    ///
    /// Names are not unique within a folder; the lowest id wins.
    pub async fn find_child(&self, parent_id: &str, name: &str) -> Result<Option<RemoteObject>> {
        let sql = format!(
            "{SELECT_OBJECT} JOIN object_parents p ON p.child_id = o.id \
             WHERE p.parent_id = ?1 AND o.name = ?2 ORDER BY o.id LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(parent_id)
            .bind(name)
            .fetch_optional(&**self)
            .await?;

        row.as_ref().map(row_to_object).transpose()
    }

    /// Insert or replace objects and their parent links in one transaction
    pub async fn upsert_objects(&self, objects: &[RemoteObject]) -> Result<()> {
        let mut tx = self.begin().await?;
        for object in objects {
            write_object(&mut *tx, object).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Delete an object and the links to its parents
    ///
    /// Links where the object is the parent are kept. Returns whether a
    /// record existed.
    pub async fn delete_object(&self, id: &str) -> Result<bool> {
        let mut tx = self.begin().await?;

        let deleted = sqlx::query("DELETE FROM objects WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM object_parents WHERE child_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted > 0)
    }
}

/// Write one object and rewrite its parent links on an open connection
pub(crate) async fn write_object(conn: &mut SqliteConnection, object: &RemoteObject) -> Result<()> {
    let size = i64::try_from(object.size)
        .map_err(|_| StoreError::Corruption(format!("size of {} overflows", object.id)))?;

    sqlx::query(
        r#"
        INSERT INTO objects (id, name, is_dir, size, last_modified, download_ref)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            is_dir = excluded.is_dir,
            size = excluded.size,
            last_modified = excluded.last_modified,
            download_ref = excluded.download_ref
        "#,
    )
    .bind(&object.id)
    .bind(&object.name)
    .bind(object.is_dir as i64)
    .bind(size)
    .bind(object.last_modified.timestamp_millis())
    .bind(&object.download_ref)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM object_parents WHERE child_id = ?1")
        .bind(&object.id)
        .execute(&mut *conn)
        .await?;

    for parent in &object.parents {
        sqlx::query("INSERT OR IGNORE INTO object_parents (parent_id, child_id) VALUES (?1, ?2)")
            .bind(parent)
            .bind(&object.id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

fn row_to_object(row: &SqliteRow) -> Result<RemoteObject> {
    let id: String = row.try_get("id")?;

    let size: i64 = row.try_get("size")?;
    let size = u64::try_from(size)
        .map_err(|_| StoreError::Corruption(format!("object {id} has negative size {size}")))?;

    let millis: i64 = row.try_get("last_modified")?;
    let last_modified = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        StoreError::Corruption(format!("object {id} has invalid timestamp {millis}"))
    })?;

    let parents: String = row.try_get("parents")?;
    let parents: Vec<String> = serde_json::from_str(&parents)
        .map_err(|e| StoreError::Corruption(format!("parents of {id}: {e}")))?;

    Ok(RemoteObject {
        name: row.try_get("name")?,
        is_dir: row.try_get::<i64, _>("is_dir")? != 0,
        size,
        last_modified,
        download_ref: row.try_get("download_ref")?,
        parents: parents.into_iter().collect(),
        id,
    })
}
