//! SQLite-backed metadata cache for nimbus
//!
//! [`ObjectStore`] mirrors the remote object graph: one record per file or
//! folder, the parent/child links between them, and the singleton values the
//! daemon needs across restarts (sync cursor, OAuth credential, root id).
//!
//! ```rust,no_run
//! use common::{Blacklist, RemoteObject};
//! use nimbus_object_store::ObjectStore;
//!
//! # async fn example() -> Result<(), nimbus_object_store::StoreError> {
//! let store = ObjectStore::open("/tmp/nimbus/cache.db", Blacklist::default()).await?;
//! store
//!     .upsert(&RemoteObject::folder("docs", "Documents", ["root"]))
//!     .await?;
//! let children = store.list_children("root").await?;
//! assert_eq!(children.len(), 1);
//! # Ok(())
//! # }
//! ```

mod database;
mod error;
mod objects;
mod store;
mod sync_state;

pub use database::Database;
pub use error::{Result, StoreError};
pub use store::ObjectStore;
