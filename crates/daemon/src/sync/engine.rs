use std::sync::Arc;

use common::{Change, MappingError, RemoteApi, RemoteError, RemoteObject};
use object_store::{ObjectStore, StoreError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Errors that abort a sync run. The cursor is left untouched.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("change feed request failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("metadata cache update failed: {0}")]
    Store(#[from] StoreError),

    #[error("root folder record is invalid: {0}")]
    Mapping(#[from] MappingError),
}

impl SyncError {
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Remote(e) if e.is_auth())
    }
}

/// Outcome of one successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pages: u64,
    /// Change entries seen, whatever their outcome
    pub processed: u64,
    pub updated: u64,
    pub deleted: u64,
    /// Entries whose record could not be mapped
    pub skipped: u64,
    pub previous_cursor: u64,
    pub cursor: u64,
}

impl SyncReport {
    pub fn was_first_sync(&self) -> bool {
        self.previous_cursor == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    /// Full-history pass from cursor 0
    FirstSync,
    Syncing,
    Failed(String),
}

/// What observers see on the status channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub status: SyncStatus,
    pub last_report: Option<SyncReport>,
}

/// Pulls the remote change feed into the object store.
///
/// The store's cursor only moves after every page of a run has been fetched
/// and applied, so a failed run is simply repeated from the same place.
pub struct ChangeSyncEngine {
    remote: Arc<dyn RemoteApi>,
    store: ObjectStore,
    page_size: u32,
    status: watch::Sender<SyncSnapshot>,
}

impl ChangeSyncEngine {
    pub fn new(remote: Arc<dyn RemoteApi>, store: ObjectStore, page_size: u32) -> Self {
        let (status, _) = watch::channel(SyncSnapshot {
            status: SyncStatus::Idle,
            last_report: None,
        });
        Self {
            remote,
            store,
            page_size,
            status,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.status.subscribe()
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Fetch the root folder and store it, so it can be listed before the
    /// first change page lands.
    pub async fn bootstrap_root(&self) -> Result<RemoteObject, SyncError> {
        let file = self.remote.root().await?;
        let mut root = file.to_object()?;
        root.parents.clear();
        self.store.set_root(&root).await?;
        Ok(root)
    }

    /// Run one full pass over the change feed.
    pub async fn run_once(&self) -> Result<SyncReport, SyncError> {
        let cursor = self.store.get_cursor().await?;
        let first_sync = cursor == 0;

        self.set_status(if first_sync {
            SyncStatus::FirstSync
        } else {
            SyncStatus::Syncing
        });
        if first_sync {
            info!("first sync started");
        } else {
            debug!(cursor, "checking for changes");
        }

        match self.apply_feed(cursor).await {
            Ok(report) => {
                if first_sync {
                    info!(
                        objects = report.updated,
                        pages = report.pages,
                        cursor = report.cursor,
                        "first sync finished"
                    );
                } else if report.processed > 0 {
                    info!(
                        updated = report.updated,
                        deleted = report.deleted,
                        skipped = report.skipped,
                        cursor = report.cursor,
                        "applied changes"
                    );
                }
                self.status.send_replace(SyncSnapshot {
                    status: SyncStatus::Idle,
                    last_report: Some(report.clone()),
                });
                Ok(report)
            }
            Err(e) => {
                self.set_status(SyncStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn apply_feed(&self, cursor: u64) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport {
            previous_cursor: cursor,
            cursor,
            ..SyncReport::default()
        };

        // The feed treats an absent start id as "from the beginning"
        let start = (cursor > 0).then_some(cursor);
        let mut page_token: Option<String> = None;
        let mut largest: Option<u64> = None;

        loop {
            let page = self
                .remote
                .changes(start, page_token.as_deref(), self.page_size)
                .await?;
            report.pages += 1;
            debug!(
                page = report.pages,
                items = page.items.len(),
                largest_change_id = page.largest_change_id,
                "fetched change page"
            );

            largest = largest.max(Some(page.largest_change_id));
            for change in &page.items {
                largest = largest.max(Some(change.id));
                self.apply_change(change, &mut report).await?;
            }

            match page.next_token() {
                Some(token) => page_token = Some(token.to_string()),
                None => break,
            }
        }

        if let Some(largest) = largest {
            let next = largest.saturating_add(1).max(cursor);
            if next != cursor {
                self.store.set_cursor(next).await?;
            }
            report.cursor = next;
        }

        Ok(report)
    }

    async fn apply_change(&self, change: &Change, report: &mut SyncReport) -> Result<(), SyncError> {
        report.processed += 1;

        if change.is_removal() {
            self.store.remove(&change.file_id).await?;
            report.deleted += 1;
            return Ok(());
        }

        let Some(file) = &change.file else {
            warn!(change_id = change.id, file_id = %change.file_id, "change entry without a file record");
            report.skipped += 1;
            return Ok(());
        };

        match file.to_object() {
            Ok(object) => {
                self.store.upsert(&object).await?;
                report.updated += 1;
            }
            Err(e) => {
                warn!(change_id = change.id, error = %e, "skipping unmappable change");
                report.skipped += 1;
            }
        }
        Ok(())
    }

    fn set_status(&self, status: SyncStatus) {
        self.status.send_modify(|snapshot| snapshot.status = status);
    }
}
