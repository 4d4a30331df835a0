//! Registry of chunk fetches in progress.
//!
//! Concurrent reads of the same chunk must cause one download. The first
//! reader registers a shared future under the chunk's key; later readers
//! clone and await it. The fetch itself runs on its own task, so it finishes
//! and deregisters even if every reader gives up waiting.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use super::chunk::ChunkKey;
use super::error::BufferError;

pub(crate) type FetchResult = Result<Bytes, BufferError>;

/// Shared future for coordinating concurrent fetches of the same chunk.
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

#[derive(Clone, Default)]
pub(crate) struct InflightRegistry {
    pending: Arc<Mutex<HashMap<ChunkKey, SharedFetch>>>,
}

impl InflightRegistry {
    /// Wait for the fetch of `key`, starting it with `fetch` if none is running.
    pub async fn fetch<F>(&self, key: &ChunkKey, fetch: F) -> FetchResult
    where
        F: FnOnce() -> BoxFuture<'static, FetchResult>,
    {
        let shared = {
            let mut pending = self.pending.lock();

            if let Some(existing) = pending.get(key) {
                tracing::trace!(chunk = %key, "joining in-flight fetch");
                existing.clone()
            } else {
                let guard = Deregister {
                    registry: self.clone(),
                    key: key.clone(),
                };
                let work = fetch();
                // Deregistration waits on the lock we hold, so it always runs
                // after the insert below, even when the work panics.
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    work.await
                });

                let shared: SharedFetch = async move {
                    handle.await.unwrap_or_else(|e| {
                        Err(BufferError::from(std::io::Error::other(format!(
                            "chunk fetch task failed: {e}"
                        ))))
                    })
                }
                .boxed()
                .shared();

                pending.insert(key.clone(), shared.clone());
                shared
            }
        };

        shared.await
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Removes a fetch from the registry when its task ends, however it ends.
struct Deregister {
    registry: InflightRegistry,
    key: ChunkKey,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        self.registry.pending.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_run() {
        let registry = InflightRegistry::default();
        let runs = Arc::new(AtomicUsize::new(0));
        let key = ChunkKey::new("obj", 0);

        let waiters = (0..5).map(|_| {
            let runs = runs.clone();
            registry.fetch(&key, move || {
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(Bytes::from_static(b"chunk"))
                }
                .boxed()
            })
        });

        for result in futures::future::join_all(waiters).await {
            assert_eq!(result.unwrap(), Bytes::from_static(b"chunk"));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_deregistered() {
        let registry = InflightRegistry::default();
        let key = ChunkKey::new("obj", 1);

        let result = registry
            .fetch(&key, || {
                async { Err(BufferError::Transport(common::RemoteError::Transport("boom".into()))) }
                    .boxed()
            })
            .await;

        assert!(matches!(result, Err(BufferError::Transport(_))));
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_panicked_fetch_is_deregistered() {
        let registry = InflightRegistry::default();
        let key = ChunkKey::new("obj", 2);

        let result = registry
            .fetch(&key, || async { panic!("fetch blew up") }.boxed())
            .await;
        assert!(matches!(result, Err(BufferError::Io(_))));
        assert_eq!(registry.len(), 0);

        // The next reader starts a fresh fetch instead of reusing the failure
        let result = registry
            .fetch(&key, || async { Ok(Bytes::from_static(b"again")) }.boxed())
            .await;
        assert_eq!(result.unwrap(), Bytes::from_static(b"again"));
    }
}
