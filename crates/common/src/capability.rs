//! Narrow interfaces consumed by a filesystem adapter
//!
//! A kernel-facing adapter only ever needs to answer two kinds of questions:
//! what the tree looks like, and what bytes live at an offset of a file.
//! Keeping those behind traits lets the adapter (or the CLI) run against the
//! real object store and buffer, or against test doubles.

use async_trait::async_trait;
use bytes::Bytes;

use crate::object::RemoteObject;

/// Read-only view of the metadata cache
///
/// Absence is `Ok(None)` / an empty list; `Err` is reserved for failures of
/// the backing store itself.
#[async_trait]
pub trait MetadataQuery: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn get(&self, id: &str) -> Result<Option<RemoteObject>, Self::Error>;

    async fn list_children(&self, parent_id: &str) -> Result<Vec<RemoteObject>, Self::Error>;

    /// Resolve one path component below `parent_id`
    async fn find_child(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<RemoteObject>, Self::Error>;
}

/// Random-access reads over one object's content
#[async_trait]
pub trait ContentRead: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read up to `length` bytes starting at `offset`
    ///
    /// Short reads happen only at end of file.
    async fn read_at(&self, offset: u64, length: u32) -> Result<Bytes, Self::Error>;

    /// Total content length in bytes
    fn size(&self) -> u64;
}
