//! Shared building blocks for nimbus
//!
//! Everything that more than one crate in the workspace needs lives here:
//!
//! - [`object`]: the [`RemoteObject`] record mirrored from the remote store
//! - [`credential`]: OAuth token material persisted by the object store
//! - [`blacklist`]: reserved names hidden from name-based lookup
//! - [`remote`]: change-feed wire types and the [`RemoteApi`] transport seam
//! - [`capability`]: the two narrow interfaces a filesystem adapter consumes

pub mod blacklist;
pub mod capability;
pub mod credential;
pub mod object;
pub mod remote;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use blacklist::Blacklist;
pub use capability::{ContentRead, MetadataQuery};
pub use credential::Credential;
pub use object::{ObjectId, RemoteObject};
pub use remote::{Change, ChangePage, MappingError, RemoteApi, RemoteError, RemoteFile};

/// Default size of one cached content chunk (5 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default number of change entries requested per change-feed page
pub const DEFAULT_PAGE_SIZE: u32 = 1000;
