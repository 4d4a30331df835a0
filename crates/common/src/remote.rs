//! Change-feed wire types and the remote transport seam
//!
//! The remote store speaks a Drive-v2-shaped JSON API: a paged change feed
//! keyed by monotonically increasing change ids, per-file metadata records,
//! and ranged content downloads. The types here mirror that wire format
//! (integers arrive string-encoded) so a transport can deserialize responses
//! straight into them.

use std::ops::Range;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::object::RemoteObject;

/// Mime type the remote store uses to mark folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Errors raised by a [`RemoteApi`] implementation
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("failed to decode remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether the failure needs the operator to re-authorize
    pub fn is_auth(&self) -> bool {
        matches!(self, RemoteError::Auth(_))
    }
}

/// A remote record that could not be turned into a [`RemoteObject`]
#[derive(Debug, Clone, thiserror::Error)]
pub enum MappingError {
    #[error("object {id} has an unparsable modification date {value:?}")]
    InvalidModifiedDate { id: String, value: String },
}

/// Reference to a parent folder inside a file record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub id: String,
}

/// File or folder metadata as returned by the remote API
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    pub title: String,
    pub mime_type: String,
    /// RFC 3339 timestamp
    pub modified_date: String,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub parents: Vec<ParentRef>,
    #[serde(default)]
    pub explicitly_trashed: bool,
}

impl RemoteFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    /// Map the wire record onto the cached object model
    pub fn to_object(&self) -> Result<RemoteObject, MappingError> {
        let last_modified = DateTime::parse_from_rfc3339(&self.modified_date)
            .map_err(|_| MappingError::InvalidModifiedDate {
                id: self.id.clone(),
                value: self.modified_date.clone(),
            })?
            .with_timezone(&Utc)
            .trunc_subsecs(3);

        let is_dir = self.is_folder();
        Ok(RemoteObject {
            id: self.id.clone(),
            name: self.title.clone(),
            is_dir,
            size: if is_dir { 0 } else { self.file_size.unwrap_or(0) },
            last_modified,
            download_ref: if is_dir {
                String::new()
            } else {
                self.download_url.clone().unwrap_or_default()
            },
            parents: self.parents.iter().map(|p| p.id.clone()).collect(),
        })
    }
}

/// One entry of the change feed
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    /// Change sequence number
    #[serde_as(as = "DisplayFromStr")]
    pub id: u64,
    pub file_id: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub file: Option<RemoteFile>,
}

impl Change {
    /// Whether this entry removes the object from the cache
    ///
    /// Both hard deletion and explicit trashing count as removal.
    pub fn is_removal(&self) -> bool {
        self.deleted || self.file.as_ref().is_some_and(|f| f.explicitly_trashed)
    }
}

/// One page of the change feed
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePage {
    #[serde(default)]
    pub items: Vec<Change>,
    /// Largest change id known to the remote at the time of the request
    #[serde_as(as = "DisplayFromStr")]
    pub largest_change_id: u64,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl ChangePage {
    /// Continuation token, if another page follows
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Transport to the remote store
///
/// Implementations own authorization; callers only see [`RemoteError`].
#[async_trait]
pub trait RemoteApi: Send + Sync + 'static {
    /// Fetch one page of the change feed
    ///
    /// `start_change_id` of `None` asks for the full history. `page_token`
    /// continues a previous page.
    async fn changes(
        &self,
        start_change_id: Option<u64>,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<ChangePage, RemoteError>;

    /// Fetch the root folder record
    async fn root(&self) -> Result<RemoteFile, RemoteError>;

    /// Download the half-open byte `range` of the content behind `download_ref`
    async fn download_range(
        &self,
        download_ref: &str,
        range: Range<u64>,
    ) -> Result<Bytes, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANGE_LIST: &str = r#"{
        "kind": "drive#changeList",
        "largestChangeId": "1742",
        "nextPageToken": "1701",
        "items": [
            {
                "kind": "drive#change",
                "id": "1700",
                "fileId": "0B1",
                "deleted": false,
                "file": {
                    "id": "0B1",
                    "title": "report.pdf",
                    "mimeType": "application/pdf",
                    "modifiedDate": "2017-03-01T10:15:00.000Z",
                    "fileSize": "52428800",
                    "downloadUrl": "https://content.example/0B1?alt=media",
                    "parents": [{"id": "0AROOT", "isRoot": true}],
                    "explicitlyTrashed": false
                }
            },
            {
                "kind": "drive#change",
                "id": "1701",
                "fileId": "0B2",
                "deleted": true
            }
        ]
    }"#;

    #[test]
    fn test_decode_change_page() {
        let page: ChangePage = serde_json::from_str(CHANGE_LIST).unwrap();
        assert_eq!(page.largest_change_id, 1742);
        assert_eq!(page.next_token(), Some("1701"));
        assert_eq!(page.items.len(), 2);

        let first = &page.items[0];
        assert_eq!(first.id, 1700);
        assert!(!first.is_removal());
        let file = first.file.as_ref().unwrap();
        assert_eq!(file.file_size, Some(52_428_800));

        assert!(page.items[1].is_removal());
        assert!(page.items[1].file.is_none());
    }

    #[test]
    fn test_map_file_to_object() {
        let page: ChangePage = serde_json::from_str(CHANGE_LIST).unwrap();
        let object = page.items[0].file.as_ref().unwrap().to_object().unwrap();

        assert_eq!(object.id, "0B1");
        assert_eq!(object.name, "report.pdf");
        assert!(!object.is_dir);
        assert_eq!(object.size, 52_428_800);
        assert_eq!(object.download_ref, "https://content.example/0B1?alt=media");
        assert!(object.has_parent("0AROOT"));
        assert_eq!(object.last_modified.timestamp(), 1_488_363_300);
    }

    #[test]
    fn test_folder_mapping_drops_size_and_download() {
        let file = RemoteFile {
            id: "dir".to_string(),
            title: "photos".to_string(),
            mime_type: FOLDER_MIME_TYPE.to_string(),
            modified_date: "2020-01-01T00:00:00Z".to_string(),
            file_size: Some(99),
            download_url: Some("https://nope".to_string()),
            parents: vec![],
            explicitly_trashed: false,
        };

        let object = file.to_object().unwrap();
        assert!(object.is_dir);
        assert_eq!(object.size, 0);
        assert!(object.download_ref.is_empty());
        assert!(object.is_root());
    }

    #[test]
    fn test_invalid_date_is_a_mapping_error() {
        let file = RemoteFile {
            id: "bad".to_string(),
            title: "x".to_string(),
            mime_type: "text/plain".to_string(),
            modified_date: "yesterday".to_string(),
            file_size: None,
            download_url: None,
            parents: vec![],
            explicitly_trashed: false,
        };

        assert!(matches!(
            file.to_object(),
            Err(MappingError::InvalidModifiedDate { .. })
        ));
    }

    #[test]
    fn test_explicit_trash_counts_as_removal() {
        let change: Change = serde_json::from_str(
            r#"{"id":"9","fileId":"t","file":{"id":"t","title":"t","mimeType":"text/plain",
                "modifiedDate":"2020-01-01T00:00:00Z","explicitlyTrashed":true}}"#,
        )
        .unwrap();
        assert!(!change.deleted);
        assert!(change.is_removal());
    }

    #[test]
    fn test_empty_page_token_ends_feed() {
        let page: ChangePage =
            serde_json::from_str(r#"{"largestChangeId":"3","nextPageToken":""}"#).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.next_token(), None);
    }
}
