use std::fmt;

use clap::Args;
use tokio::io::AsyncWriteExt;

use nimbus_daemon::buffer::{BufferError, ChunkCache};
use nimbus_daemon::lookup::resolve_path;
use nimbus_daemon::process::{connect_remote, open_store, ServiceError};
use nimbus_daemon::state::{AppState, StateError};
use nimbus_daemon::ServiceConfig;
use object_store::StoreError;

/// Largest slice requested from the buffer per read
const READ_SIZE: u32 = 1024 * 1024;

/// Print a file's content through the chunk cache
#[derive(Args, Debug, Clone)]
pub struct Cat {
    /// Path below the root folder
    pub path: String,

    /// Start reading at this byte offset
    #[arg(long, default_value_t = 0)]
    pub offset: u64,

    /// Read at most this many bytes (default: to end of file)
    #[arg(long)]
    pub length: Option<u64>,
}

/// The content itself goes to stdout; nothing else is printed.
#[derive(Debug)]
pub struct CatOutput;

impl fmt::Display for CatOutput {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("metadata cache: {0}")]
    Store(#[from] StoreError),

    #[error("no such path: {0}")]
    NotFound(String),

    #[error("read failed: {0}")]
    Buffer(#[from] BufferError),

    #[error("could not write to stdout: {0}")]
    Stdout(#[from] std::io::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Cat {
    type Error = CatError;
    type Output = CatOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let config = ServiceConfig::from_state(&state);
        let store = open_store(&config).await?;

        let root_id = store.root_id().await?;
        let object = resolve_path(&store, &root_id, &self.path)
            .await?
            .ok_or_else(|| CatError::NotFound(self.path.clone()))?;

        let remote = connect_remote(&config, &store).await?;
        let cache = ChunkCache::new(&config.chunk_dir, config.chunk_size, remote)?;
        let buffer = cache.open(object)?;

        let size = buffer.object().size;
        let end = match self.length {
            Some(length) => self.offset.saturating_add(length).min(size),
            None => size,
        };

        let mut stdout = tokio::io::stdout();
        let mut offset = self.offset;
        while offset < end {
            let want = (end - offset).min(READ_SIZE as u64) as u32;
            let bytes = buffer.read_at(offset, want).await?;
            if bytes.is_empty() {
                break;
            }
            stdout.write_all(&bytes).await?;
            offset += bytes.len() as u64;
        }
        stdout.flush().await?;
        store.close().await;

        tracing::debug!(
            path = %self.path,
            bytes = offset.saturating_sub(self.offset),
            "wrote file content"
        );
        Ok(CatOutput)
    }
}
