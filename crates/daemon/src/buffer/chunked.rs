use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use common::{ContentRead, RemoteObject};
use futures::future::try_join_all;

use super::cache::ChunkCache;
use super::chunk::chunk_span;
use super::error::BufferError;

/// Random-access reader over one remote object's content.
///
/// Reads are served by composing fixed-size chunks from the shared
/// [`ChunkCache`]; chunks not yet on disk are downloaded with ranged requests.
#[derive(Clone)]
pub struct ChunkedBuffer {
    cache: ChunkCache,
    object: RemoteObject,
}

impl ChunkedBuffer {
    pub(crate) fn new(cache: ChunkCache, object: RemoteObject) -> Self {
        Self { cache, object }
    }

    pub fn object(&self) -> &RemoteObject {
        &self.object
    }

    /// Read up to `length` bytes at `offset`.
    ///
    /// Returns `min(length, size - offset)` bytes; fails with `OutOfRange`
    /// when `offset` is at or past the end.
    pub async fn read_at(&self, offset: u64, length: u32) -> Result<Bytes, BufferError> {
        let size = self.object.size;
        if offset >= size {
            return Err(BufferError::OutOfRange {
                object_id: self.object.id.clone(),
                offset,
                size,
            });
        }

        let end = offset.saturating_add(u64::from(length)).min(size);
        if end == offset {
            return Ok(Bytes::new());
        }

        let chunk_size = self.cache.chunk_size();
        let indices = chunk_span(offset, end, chunk_size);
        let mut slices: Vec<Bytes> = try_join_all(indices.map(|index| {
            let chunk_start = index * chunk_size;
            let from = offset.max(chunk_start) - chunk_start;
            let to = end.min(chunk_start + chunk_size) - chunk_start;
            self.cache.read_chunk(&self.object, index, from..to)
        }))
        .await?;

        if slices.len() == 1 {
            return Ok(slices.remove(0));
        }

        let mut out = BytesMut::with_capacity((end - offset) as usize);
        for slice in &slices {
            out.extend_from_slice(slice);
        }
        Ok(out.freeze())
    }
}

#[async_trait]
impl ContentRead for ChunkedBuffer {
    type Error = BufferError;

    async fn read_at(&self, offset: u64, length: u32) -> Result<Bytes, BufferError> {
        ChunkedBuffer::read_at(self, offset, length).await
    }

    fn size(&self) -> u64 {
        self.object.size
    }
}
