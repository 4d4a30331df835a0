//! On-disk chunk cache shared by every open buffer.

use std::io::{SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use common::{RemoteApi, RemoteError, RemoteObject};
use futures::FutureExt;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use super::chunk::{chunk_bounds, ChunkKey};
use super::chunked::ChunkedBuffer;
use super::error::BufferError;
use super::inflight::{FetchResult, InflightRegistry};
use super::PARTIAL_PREFIX;

/// Fixed chunk configuration plus the in-flight fetch registry.
///
/// Created once at startup; every [`ChunkedBuffer`] is opened from it so that
/// all readers of an object share one registry. Cloning is cheap.
#[derive(Clone)]
pub struct ChunkCache {
    inner: Arc<Inner>,
}

struct Inner {
    dir: PathBuf,
    chunk_size: u64,
    remote: Arc<dyn RemoteApi>,
    inflight: InflightRegistry,
}

impl ChunkCache {
    /// Create the cache, making sure `dir` exists.
    pub fn new(
        dir: impl Into<PathBuf>,
        chunk_size: u64,
        remote: Arc<dyn RemoteApi>,
    ) -> Result<Self, BufferError> {
        let dir = dir.into();
        if chunk_size == 0 {
            return Err(BufferError::from(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "chunk size must be positive",
            )));
        }
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            inner: Arc::new(Inner {
                dir,
                chunk_size,
                remote,
                inflight: InflightRegistry::default(),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn chunk_size(&self) -> u64 {
        self.inner.chunk_size
    }

    /// Open a reader over `object`'s content.
    pub fn open(&self, object: RemoteObject) -> Result<ChunkedBuffer, BufferError> {
        if object.is_dir {
            return Err(BufferError::IsDirectory(object.id));
        }
        Ok(ChunkedBuffer::new(self.clone(), object))
    }

    pub fn chunk_path(&self, key: &ChunkKey) -> PathBuf {
        self.inner.dir.join(key.file_name())
    }

    /// Number of chunk fetches currently in progress.
    pub fn inflight(&self) -> usize {
        self.inner.inflight.len()
    }

    /// Read `within` (offsets relative to the chunk start) of chunk `index`
    /// of `object`.
    ///
    /// A cached chunk is read in place, touching only the requested bytes.
    /// Otherwise the whole chunk is downloaded once and sliced.
    pub(crate) async fn read_chunk(
        &self,
        object: &RemoteObject,
        index: u64,
        within: Range<u64>,
    ) -> FetchResult {
        let key = ChunkKey::new(object.id.clone(), index);
        let bounds = chunk_bounds(index, self.inner.chunk_size, object.size);
        let expected = bounds.end - bounds.start;
        let path = self.chunk_path(&key);

        if let Some(bytes) = read_cached_range(&path, expected, within.clone()).await? {
            return Ok(bytes);
        }

        let chunk = self.fetch_chunk(key, bounds, path, object.download_ref.clone()).await?;
        Ok(chunk.slice(within.start as usize..within.end as usize))
    }

    /// Download chunk `key` unless a concurrent fetch already is.
    async fn fetch_chunk(
        &self,
        key: ChunkKey,
        bounds: Range<u64>,
        path: PathBuf,
        download_ref: String,
    ) -> FetchResult {
        let remote = self.inner.remote.clone();
        let dir = self.inner.dir.clone();
        let fetch_key = key.clone();

        self.inner
            .inflight
            .fetch(&key, move || {
                async move {
                    let expected = bounds.end - bounds.start;

                    // Another fetch may have landed between our disk check and
                    // registering this one.
                    if let Some(bytes) = read_cached_range(&path, expected, 0..expected).await? {
                        return Ok(bytes);
                    }

                    debug!(chunk = %fetch_key, start = bounds.start, end = bounds.end, "fetching chunk");
                    let bytes = remote.download_range(&download_ref, bounds.clone()).await?;
                    if bytes.len() as u64 != expected {
                        return Err(BufferError::Transport(RemoteError::Transport(format!(
                            "short body for chunk {fetch_key}: got {} of {expected} bytes",
                            bytes.len()
                        ))));
                    }

                    let data = bytes.clone();
                    tokio::task::spawn_blocking(move || persist_chunk(&dir, &path, &data))
                        .await
                        .map_err(|e| std::io::Error::other(e.to_string()))??;

                    Ok(bytes)
                }
                .boxed()
            })
            .await
    }
}

/// Read `range` of a cached chunk file.
///
/// A missing file, or one whose length is not `expected`, counts as absent.
async fn read_cached_range(
    path: &Path,
    expected: u64,
    range: Range<u64>,
) -> Result<Option<Bytes>, BufferError> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let len = file.metadata().await?.len();
    if len != expected {
        warn!(path = ?path, len, expected, "discarding chunk with unexpected length");
        return Ok(None);
    }

    let mut buf = BytesMut::zeroed((range.end - range.start) as usize);
    file.seek(SeekFrom::Start(range.start)).await?;
    file.read_exact(&mut buf).await?;
    Ok(Some(buf.freeze()))
}

/// Write `data` to a temp file in `dir`, then rename it to `path`.
///
/// On any failure the temp file is removed when dropped.
fn persist_chunk(dir: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .tempfile_in(dir)?;
    file.write_all(data)?;
    file.as_file().sync_data()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
