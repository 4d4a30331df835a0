use std::fmt;
use std::path::{Path, PathBuf};

use clap::Args;
use owo_colors::OwoColorize;

use common::Credential;
use nimbus_daemon::buffer::PARTIAL_PREFIX;
use nimbus_daemon::state::{AppState, StateError};
use nimbus_daemon::ServiceConfig;
use object_store::{ObjectStore, StoreError};

/// Summarize the local cache state
#[derive(Args, Debug, Clone)]
pub struct Status;

#[derive(Debug, Default)]
pub struct ChunkDirInfo {
    pub chunks: u64,
    pub partials: u64,
    pub bytes: u64,
}

#[derive(Debug)]
pub struct StatusOutput {
    pub nimbus_dir: PathBuf,
    pub cursor: u64,
    pub objects: u64,
    pub root: Option<String>,
    pub credential: Option<Credential>,
    pub chunk_dir: PathBuf,
    pub chunk_info: Option<ChunkDirInfo>,
}

impl fmt::Display for StatusOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", "Cache".bold())?;
        writeln!(f, "  {} {}", "directory:".dimmed(), self.nimbus_dir.display())?;
        writeln!(f, "  {} {}", "objects:".dimmed(), self.objects)?;
        let cursor = if self.cursor == 0 {
            "0 (cold sync pending)".yellow().to_string()
        } else {
            self.cursor.to_string()
        };
        writeln!(f, "  {} {}", "cursor:".dimmed(), cursor)?;
        match &self.root {
            Some(root) => writeln!(f, "  {} {}", "root:".dimmed(), root)?,
            None => writeln!(f, "  {} {}", "root:".dimmed(), "not bootstrapped".yellow())?,
        }

        writeln!(f)?;
        writeln!(f, "{}:", "Credential".bold())?;
        match &self.credential {
            Some(credential) => {
                let expired = credential.is_expired(chrono::Utc::now(), chrono::Duration::zero());
                let expiry = match credential.expiry {
                    Some(expiry) if expired => format!("{} ({})", expiry.to_rfc3339(), "expired".red()),
                    Some(expiry) => expiry.to_rfc3339(),
                    None => "unknown".to_string(),
                };
                writeln!(f, "  {} {}", "expires:".dimmed(), expiry)?;
                let refresh = if credential.can_refresh() {
                    "yes".green().to_string()
                } else {
                    "no".red().to_string()
                };
                writeln!(f, "  {} {}", "refreshable:".dimmed(), refresh)?;
            }
            None => writeln!(
                f,
                "  {} {}",
                "missing".red(),
                "(run `nimbus auth`)".dimmed()
            )?,
        }

        writeln!(f)?;
        writeln!(f, "{} ({}):", "Chunks".bold(), self.chunk_dir.display())?;
        match &self.chunk_info {
            Some(info) => {
                writeln!(f, "  {} {}", "chunks:".dimmed(), info.chunks)?;
                writeln!(f, "  {} {}", "partial:".dimmed(), info.partials)?;
                write!(f, "  {} {}", "bytes:".dimmed(), info.bytes)
            }
            None => write!(f, "  {}", "empty".dimmed()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("metadata cache: {0}")]
    Store(#[from] StoreError),

    #[error("could not read chunk directory: {0}")]
    ChunkDir(#[from] std::io::Error),
}

async fn chunk_dir_info(dir: &Path) -> Result<Option<ChunkDirInfo>, std::io::Error> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut info = ChunkDirInfo::default();
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with(PARTIAL_PREFIX) {
            info.partials += 1;
        } else {
            info.chunks += 1;
        }
        info.bytes += metadata.len();
    }
    Ok(Some(info))
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Status {
    type Error = StatusError;
    type Output = StatusOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let config = ServiceConfig::from_state(&state);
        let store = ObjectStore::open(&config.db_path, config.blacklist.clone()).await?;

        let cursor = store.get_cursor().await?;
        let objects = store.count().await?;
        let root = match store.root().await {
            Ok(root) => Some(format!("{} ({})", root.name, root.id)),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        let credential = match store.get_credential().await {
            Ok(credential) => Some(credential),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        store.close().await;

        let chunk_info = chunk_dir_info(&config.chunk_dir).await?;

        Ok(StatusOutput {
            nimbus_dir: state.nimbus_dir,
            cursor,
            objects,
            root,
            credential,
            chunk_dir: config.chunk_dir,
            chunk_info,
        })
    }
}
