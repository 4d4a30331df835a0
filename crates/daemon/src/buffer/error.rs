use std::sync::Arc;

use common::RemoteError;

/// Errors returned by chunked reads.
///
/// Cloneable so a single in-flight fetch can hand the same failure to every
/// waiting reader.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BufferError {
    #[error("offset {offset} is past the end of {object_id} ({size} bytes)")]
    OutOfRange {
        object_id: String,
        offset: u64,
        size: u64,
    },

    #[error("chunk fetch failed: {0}")]
    Transport(#[from] RemoteError),

    #[error("chunk io failed: {0}")]
    Io(Arc<std::io::Error>),

    #[error("{0} is a directory")]
    IsDirectory(String),
}

impl From<std::io::Error> for BufferError {
    fn from(e: std::io::Error) -> Self {
        BufferError::Io(Arc::new(e))
    }
}
