//! Reserved names hidden from name-based lookup
//!
//! The blacklist is configuration, not data: it is built once at startup and
//! handed to the object store by value. Lookups for a blacklisted name behave
//! as if the entry never existed, even when a record with that name is stored.

use std::collections::HashSet;
use std::sync::Arc;

/// Names hidden by default: version-control metadata and desktop trash folders
pub const DEFAULT_BLACKLIST: &[&str] = &[".git", "HEAD", ".Trash", ".Trash-1000"];

/// Immutable set of blacklisted names
///
/// Cloning is cheap; all clones share the same set.
#[derive(Debug, Clone)]
pub struct Blacklist {
    names: Arc<HashSet<String>>,
}

impl Default for Blacklist {
    fn default() -> Self {
        Self::new(DEFAULT_BLACKLIST.iter().copied())
    }
}

impl Blacklist {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Arc::new(names.into_iter().map(Into::into).collect()),
        }
    }

    /// A blacklist that hides nothing
    pub fn empty() -> Self {
        Self::new(std::iter::empty::<String>())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
