//! Remote object record
//!
//! A [`RemoteObject`] is one file or folder of the remote store as the local
//! cache sees it. Records are created and replaced wholesale by the sync
//! engine; readers never mutate them.

use std::collections::BTreeSet;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Globally unique id assigned by the remote store
pub type ObjectId = String;

/// One remote file or folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Primary key
    pub id: ObjectId,
    /// Display name, unique only within a parent
    pub name: String,
    pub is_dir: bool,
    /// Content length in bytes (0 for directories)
    pub size: u64,
    /// Millisecond precision, matching what the metadata cache persists
    pub last_modified: DateTime<Utc>,
    /// Opaque reference used to fetch content; empty for directories
    pub download_ref: String,
    /// Ids of all parents; empty for the root
    pub parents: BTreeSet<ObjectId>,
}

impl RemoteObject {
    /// Build a folder record
    pub fn folder<I, S>(id: impl Into<String>, name: impl Into<String>, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            is_dir: true,
            size: 0,
            last_modified: Utc::now().trunc_subsecs(3),
            download_ref: String::new(),
            parents: parents.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a regular file record
    pub fn file<I, S>(
        id: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        download_ref: impl Into<String>,
        parents: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            is_dir: false,
            size,
            last_modified: Utc::now().trunc_subsecs(3),
            download_ref: download_ref.into(),
            parents: parents.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `parent` is one of this object's parents
    pub fn has_parent(&self, parent: &str) -> bool {
        self.parents.contains(parent)
    }

    /// Whether this object has no parents (the root of a tree)
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_has_no_content() {
        let folder = RemoteObject::folder("f1", "docs", ["root"]);
        assert!(folder.is_dir);
        assert_eq!(folder.size, 0);
        assert!(folder.download_ref.is_empty());
        assert!(folder.has_parent("root"));
        assert!(!folder.is_root());
    }

    #[test]
    fn test_multiple_parents_are_deduplicated() {
        let file = RemoteObject::file("x", "a.txt", 3, "https://dl/x", ["p1", "p2", "p1"]);
        assert_eq!(file.parents.len(), 2);
        assert!(file.has_parent("p1"));
        assert!(file.has_parent("p2"));
    }
}
