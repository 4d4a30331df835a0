//! Chunk addressing.
//!
//! Content is cached in fixed-size chunks: chunk `i` of an object covers
//! bytes `[i * chunk_size, (i + 1) * chunk_size)`, truncated at the object's
//! size for the final chunk.

use std::fmt;
use std::ops::{Range, RangeInclusive};

/// Identifies one chunk of one object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub object_id: String,
    pub index: u64,
}

impl ChunkKey {
    pub fn new(object_id: impl Into<String>, index: u64) -> Self {
        Self {
            object_id: object_id.into(),
            index,
        }
    }

    /// File name of the chunk inside the chunk directory
    ///
    /// Object ids are escaped so that every id maps to a distinct, plain file
    /// name without path separators or dots.
    pub fn file_name(&self) -> String {
        format!("{}.{}", escape_id(&self.object_id), self.index)
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.object_id, self.index)
    }
}

fn escape_id(id: &str) -> String {
    let mut escaped = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => escaped.push(byte as char),
            _ => escaped.push_str(&format!("%{byte:02x}")),
        }
    }
    escaped
}

/// Indices of the chunks covering `[offset, end)`; `end` must be > `offset`
pub fn chunk_span(offset: u64, end: u64, chunk_size: u64) -> RangeInclusive<u64> {
    debug_assert!(end > offset);
    (offset / chunk_size)..=((end - 1) / chunk_size)
}

/// Byte range of chunk `index` within an object of `object_size` bytes
pub fn chunk_bounds(index: u64, chunk_size: u64, object_size: u64) -> Range<u64> {
    let start = index.saturating_mul(chunk_size).min(object_size);
    let end = start.saturating_add(chunk_size).min(object_size);
    start..end
}
