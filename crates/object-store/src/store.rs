//! The metadata cache as seen by the rest of the system.

use std::path::Path;

use async_trait::async_trait;
use common::{Blacklist, Credential, MetadataQuery, RemoteObject};
use tracing::{debug, info};

use crate::database::Database;
use crate::error::{Result, StoreError};

/// Durable cache of the remote object graph.
///
/// Only the sync engine writes; lookups from the filesystem side go through
/// [`MetadataQuery`]. Every mutation is one SQLite transaction and every read
/// is one statement, so readers never see an object without its links.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    db: Database,
    blacklist: Blacklist,
}

impl ObjectStore {
    /// Open the cache database at `path`, creating it if needed.
    pub async fn open(path: impl AsRef<Path>, blacklist: Blacklist) -> Result<Self> {
        let db = Database::new(path).await?;
        Ok(Self { db, blacklist })
    }

    /// Ephemeral cache, for tests.
    pub async fn in_memory(blacklist: Blacklist) -> Result<Self> {
        let db = Database::in_memory().await?;
        Ok(Self { db, blacklist })
    }

    /// Close the connection pool; pending queries finish first.
    pub async fn close(&self) {
        self.db.close().await;
        info!("metadata cache closed");
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    pub async fn get(&self, id: &str) -> Result<RemoteObject> {
        self.db
            .get_object(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("object {id}")))
    }

    /// Children of `parent_id`; empty if it has none or does not exist.
    pub async fn list_children(&self, parent_id: &str) -> Result<Vec<RemoteObject>> {
        self.db.list_children(parent_id).await
    }

    /// Resolve `name` below `parent_id`.
    ///
    /// Blacklisted names are never found, even if such a child is stored.
    pub async fn find_child(&self, parent_id: &str, name: &str) -> Result<RemoteObject> {
        let not_found = || StoreError::NotFound(format!("{name} in {parent_id}"));

        if self.blacklist.contains(name) {
            debug!(parent_id, name, "lookup of blacklisted name");
            return Err(not_found());
        }

        self.db
            .find_child(parent_id, name)
            .await?
            .ok_or_else(not_found)
    }

    /// Insert or replace `object`, rewriting its parent links.
    pub async fn upsert(&self, object: &RemoteObject) -> Result<()> {
        self.db.upsert_objects(std::slice::from_ref(object)).await?;
        debug!(id = %object.id, name = %object.name, parents = object.parents.len(), "upserted object");
        Ok(())
    }

    /// Upsert several objects in one transaction.
    pub async fn upsert_batch(&self, objects: &[RemoteObject]) -> Result<()> {
        self.db.upsert_objects(objects).await?;
        debug!(count = objects.len(), "upserted batch");
        Ok(())
    }

    /// Remove `id` and its parent links. Its own children are left alone.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let existed = self.db.delete_object(id).await?;
        debug!(id, existed, "removed object");
        Ok(())
    }

    pub async fn count(&self) -> Result<u64> {
        self.db.object_count().await
    }

    pub async fn get_cursor(&self) -> Result<u64> {
        self.db.get_cursor().await
    }

    pub async fn set_cursor(&self, cursor: u64) -> Result<()> {
        self.db.set_cursor(cursor).await
    }

    pub async fn get_credential(&self) -> Result<Credential> {
        self.db.get_credential().await
    }

    pub async fn set_credential(&self, credential: &Credential) -> Result<()> {
        self.db.set_credential(credential).await
    }

    /// Store the root folder and remember its id.
    pub async fn set_root(&self, root: &RemoteObject) -> Result<()> {
        self.db.set_root(root).await?;
        info!(id = %root.id, "root folder stored");
        Ok(())
    }

    pub async fn root_id(&self) -> Result<String> {
        self.db.root_id().await
    }

    /// The stored root folder.
    pub async fn root(&self) -> Result<RemoteObject> {
        let id = self.root_id().await?;
        self.get(&id).await
    }
}

#[async_trait]
impl MetadataQuery for ObjectStore {
    type Error = StoreError;

    async fn get(&self, id: &str) -> Result<Option<RemoteObject>> {
        not_found_as_none(ObjectStore::get(self, id).await)
    }

    async fn list_children(&self, parent_id: &str) -> Result<Vec<RemoteObject>> {
        ObjectStore::list_children(self, parent_id).await
    }

    async fn find_child(&self, parent_id: &str, name: &str) -> Result<Option<RemoteObject>> {
        not_found_as_none(ObjectStore::find_child(self, parent_id, name).await)
    }
}

fn not_found_as_none<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
