//! Chunked content buffer
//!
//! Turns arbitrary `(offset, length)` reads into fixed-size chunk downloads
//! cached under the chunk directory. Each chunk is fetched with one ranged
//! request, written to a `.partial-` temp file and renamed into place, so a
//! chunk file is either absent or complete. Concurrent readers of the same
//! chunk share a single download.

mod cache;
mod chunk;
mod chunked;
mod error;
mod inflight;

pub use cache::ChunkCache;
pub use chunk::{chunk_bounds, chunk_span, ChunkKey};
pub use chunked::ChunkedBuffer;
pub use error::BufferError;

/// File name prefix of chunks still being written
pub const PARTIAL_PREFIX: &str = ".partial-";
