//! Coarse eviction of the chunk directory.
//!
//! Every sweep deletes all cached chunks. Readers never notice beyond a
//! refetch: a chunk is either on disk and complete, or absent. Temp files of
//! fetches in progress are skipped unless they are old enough that their
//! writer must have died.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::buffer::PARTIAL_PREFIX;
use crate::scheduler::PeriodicTask;

/// What a sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub files: u64,
    pub bytes: u64,
    /// In-progress temp files left alone
    pub skipped: u64,
}

#[derive(Debug, Clone)]
pub struct ChunkReaper {
    dir: PathBuf,
    partial_max_age: Duration,
}

impl ChunkReaper {
    pub fn new(dir: impl Into<PathBuf>, partial_max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            partial_max_age,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete every chunk file in the directory.
    pub async fn sweep(&self) -> std::io::Result<ReapReport> {
        let mut report = ReapReport::default();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e),
        };

        let now = SystemTime::now();
        while let Some(entry) = entries.next_entry().await? {
            // Gone already: someone else cleaned up or the fetch renamed it
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if !metadata.is_file() {
                continue;
            }

            let name = entry.file_name();
            if name.to_string_lossy().starts_with(PARTIAL_PREFIX) {
                let age = metadata
                    .modified()
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .unwrap_or_default();
                if age < self.partial_max_age {
                    report.skipped += 1;
                    continue;
                }
                debug!(file = ?name, age = ?age, "removing abandoned partial chunk");
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    report.files += 1;
                    report.bytes += metadata.len();
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }
}

/// Runs [`ChunkReaper::sweep`] on the scheduler.
pub struct ChunkReaperTask {
    reaper: ChunkReaper,
    interval: Duration,
}

impl ChunkReaperTask {
    /// Partial files older than one interval are treated as abandoned.
    pub fn new(dir: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            reaper: ChunkReaper::new(dir, interval),
            interval,
        }
    }
}

#[async_trait]
impl PeriodicTask for ChunkReaperTask {
    fn name(&self) -> &'static str {
        "chunk-reaper"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run_immediately(&self) -> bool {
        false
    }

    async fn tick(&self) {
        match self.reaper.sweep().await {
            Ok(report) if report.files > 0 => info!(
                files = report.files,
                bytes = report.bytes,
                skipped = report.skipped,
                "cleared chunk directory"
            ),
            Ok(report) => debug!(skipped = report.skipped, "chunk directory already empty"),
            Err(e) => warn!(dir = ?self.reaper.dir(), error = %e, "could not clear chunk directory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweep_removes_chunks_and_counts_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc.0"), vec![0u8; 100]).unwrap();
        std::fs::write(dir.path().join("abc.1"), vec![0u8; 28]).unwrap();

        let reaper = ChunkReaper::new(dir.path(), Duration::from_secs(60));
        let report = reaper.sweep().await.unwrap();

        assert_eq!(report.files, 2);
        assert_eq!(report.bytes, 128);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_fresh_partial_files_survive() {
        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join(format!("{PARTIAL_PREFIX}x1y2"));
        std::fs::write(&partial, b"half").unwrap();

        let report = ChunkReaper::new(dir.path(), Duration::from_secs(60))
            .sweep()
            .await
            .unwrap();

        assert_eq!(report.files, 0);
        assert_eq!(report.skipped, 1);
        assert!(partial.exists());
    }

    #[tokio::test]
    async fn test_stale_partial_files_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join(format!("{PARTIAL_PREFIX}abandoned"));
        std::fs::write(&partial, b"half").unwrap();

        let report = ChunkReaper::new(dir.path(), Duration::ZERO)
            .sweep()
            .await
            .unwrap();

        assert_eq!(report.files, 1);
        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let reaper = ChunkReaper::new(dir.path().join("never-created"), Duration::ZERO);
        assert_eq!(reaper.sweep().await.unwrap(), ReapReport::default());
    }
}
