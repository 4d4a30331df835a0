//! Scripted in-process [`RemoteApi`] for tests
//!
//! [`ScriptedRemote`] serves a fixed list of change pages chained by
//! continuation tokens, serves content from memory, records every request and
//! can be told to fail a given page or download a number of times.

use std::collections::HashMap;
use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::remote::{
    Change, ChangePage, ParentRef, RemoteApi, RemoteError, RemoteFile, FOLDER_MIME_TYPE,
};

const TOKEN_PREFIX: &str = "page-";

/// One recorded `changes` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangesCall {
    pub start_change_id: Option<u64>,
    pub page_token: Option<String>,
}

#[derive(Default)]
struct Script {
    pages: Vec<(Vec<Change>, u64)>,
    page_failures: HashMap<usize, u32>,
    download_failures: u32,
    root: Option<RemoteFile>,
    contents: HashMap<String, Bytes>,
    latency: Option<Duration>,
    changes_calls: Vec<ChangesCall>,
    range_calls: Vec<(String, Range<u64>)>,
}

/// Fake remote store driven entirely by the test
#[derive(Default)]
pub struct ScriptedRemote {
    script: Mutex<Script>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change page; `largest_change_id` is reported on that page
    pub fn push_page(&self, items: Vec<Change>, largest_change_id: u64) {
        self.script.lock().pages.push((items, largest_change_id));
    }

    /// Make the page at `index` fail `times` times before succeeding
    pub fn fail_page(&self, index: usize, times: u32) {
        self.script.lock().page_failures.insert(index, times);
    }

    /// Make the next `times` downloads fail
    pub fn fail_downloads(&self, times: u32) {
        self.script.lock().download_failures = times;
    }

    pub fn set_root(&self, root: RemoteFile) {
        self.script.lock().root = Some(root);
    }

    pub fn put_content(&self, download_ref: impl Into<String>, content: impl Into<Bytes>) {
        self.script
            .lock()
            .contents
            .insert(download_ref.into(), content.into());
    }

    /// Delay every download by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.script.lock().latency = Some(latency);
    }

    pub fn changes_calls(&self) -> Vec<ChangesCall> {
        self.script.lock().changes_calls.clone()
    }

    pub fn range_calls(&self) -> Vec<(String, Range<u64>)> {
        self.script.lock().range_calls.clone()
    }

    pub fn range_call_count(&self) -> usize {
        self.script.lock().range_calls.len()
    }
}

#[async_trait]
impl RemoteApi for ScriptedRemote {
    async fn changes(
        &self,
        start_change_id: Option<u64>,
        page_token: Option<&str>,
        _max_results: u32,
    ) -> Result<ChangePage, RemoteError> {
        let mut script = self.script.lock();
        script.changes_calls.push(ChangesCall {
            start_change_id,
            page_token: page_token.map(str::to_string),
        });

        let index = match page_token {
            Some(token) => token
                .strip_prefix(TOKEN_PREFIX)
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| RemoteError::Status {
                    status: 400,
                    body: format!("invalid page token {token}"),
                })?,
            None => 0,
        };

        if let Some(remaining) = script.page_failures.get_mut(&index) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RemoteError::Transport(format!(
                    "scripted failure on page {index}"
                )));
            }
        }

        let Some((items, largest)) = script.pages.get(index) else {
            let largest = script.pages.last().map(|(_, l)| *l).unwrap_or(0);
            return Ok(ChangePage {
                items: vec![],
                largest_change_id: largest,
                next_page_token: None,
            });
        };

        let start = start_change_id.unwrap_or(0);
        let items = items.iter().filter(|c| c.id >= start).cloned().collect();
        let next_page_token =
            (index + 1 < script.pages.len()).then(|| format!("{TOKEN_PREFIX}{}", index + 1));

        Ok(ChangePage {
            items,
            largest_change_id: *largest,
            next_page_token,
        })
    }

    async fn root(&self) -> Result<RemoteFile, RemoteError> {
        self.script.lock().root.clone().ok_or(RemoteError::Status {
            status: 404,
            body: "no root scripted".to_string(),
        })
    }

    async fn download_range(
        &self,
        download_ref: &str,
        range: Range<u64>,
    ) -> Result<Bytes, RemoteError> {
        let latency = {
            let mut script = self.script.lock();
            script
                .range_calls
                .push((download_ref.to_string(), range.clone()));
            script.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut script = self.script.lock();
        if script.download_failures > 0 {
            script.download_failures -= 1;
            return Err(RemoteError::Transport("scripted download failure".to_string()));
        }

        let content = script
            .contents
            .get(download_ref)
            .ok_or_else(|| RemoteError::Status {
                status: 404,
                body: format!("unknown download ref {download_ref}"),
            })?;

        let len = content.len() as u64;
        if range.start >= len {
            return Err(RemoteError::Status {
                status: 416,
                body: "range not satisfiable".to_string(),
            });
        }
        Ok(content.slice(range.start as usize..range.end.min(len) as usize))
    }
}

/// Wire record for a regular file
pub fn remote_file(id: &str, title: &str, parent: &str, size: u64) -> RemoteFile {
    RemoteFile {
        id: id.to_string(),
        title: title.to_string(),
        mime_type: "application/octet-stream".to_string(),
        modified_date: "2021-06-01T12:00:00.000Z".to_string(),
        file_size: Some(size),
        download_url: Some(format!("https://content.test/{id}")),
        parents: vec![ParentRef {
            id: parent.to_string(),
        }],
        explicitly_trashed: false,
    }
}

/// Wire record for a folder; an empty `parent` makes a root
pub fn remote_folder(id: &str, title: &str, parent: &str) -> RemoteFile {
    RemoteFile {
        id: id.to_string(),
        title: title.to_string(),
        mime_type: FOLDER_MIME_TYPE.to_string(),
        modified_date: "2021-06-01T12:00:00.000Z".to_string(),
        file_size: None,
        download_url: None,
        parents: if parent.is_empty() {
            vec![]
        } else {
            vec![ParentRef {
                id: parent.to_string(),
            }]
        },
        explicitly_trashed: false,
    }
}

/// Change entry carrying an updated record
pub fn update(id: u64, file: RemoteFile) -> Change {
    Change {
        id,
        file_id: file.id.clone(),
        deleted: false,
        file: Some(file),
    }
}

/// Change entry deleting `file_id`
pub fn deletion(id: u64, file_id: &str) -> Change {
    Change {
        id,
        file_id: file_id.to_string(),
        deleted: true,
        file: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pages_chain_through_tokens() {
        let remote = ScriptedRemote::new();
        remote.push_page(vec![update(1, remote_file("a", "a", "root", 1))], 2);
        remote.push_page(vec![deletion(2, "a")], 2);

        let first = remote.changes(None, None, 10).await.unwrap();
        assert_eq!(first.next_token(), Some("page-1"));
        let second = remote.changes(None, first.next_token(), 10).await.unwrap();
        assert_eq!(second.next_token(), None);
        assert!(second.items[0].is_removal());
        assert_eq!(remote.changes_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_page_failure_is_consumed() {
        let remote = ScriptedRemote::new();
        remote.push_page(vec![], 0);
        remote.fail_page(0, 1);

        assert!(remote.changes(None, None, 10).await.is_err());
        assert!(remote.changes(None, None, 10).await.is_ok());
    }

    #[tokio::test]
    async fn test_range_download_is_clamped() {
        let remote = ScriptedRemote::new();
        remote.put_content("ref", Bytes::from_static(b"0123456789"));

        let bytes = remote.download_range("ref", 8..20).await.unwrap();
        assert_eq!(&bytes[..], b"89");
        assert_eq!(remote.range_call_count(), 1);
    }
}
