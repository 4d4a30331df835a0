//! Service lifecycle: open the cache, connect to the remote, start the
//! background tasks, and tear everything down again.

use std::sync::Arc;

use common::RemoteApi;
use object_store::{ObjectStore, StoreError};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::buffer::{BufferError, ChunkCache};
use crate::reaper::ChunkReaperTask;
use crate::remote::{DriveClient, TokenSource};
use crate::scheduler::{Scheduler, ShutdownHandle};
use crate::service_config::Config;
use crate::sync::{ChangeSyncEngine, ChangeSyncTask, SyncError, SyncSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("metadata cache: {0}")]
    Store(#[from] StoreError),

    #[error("no credential stored; run `nimbus auth` first")]
    MissingCredential,

    #[error("initial sync setup failed: {0}")]
    Sync(#[from] SyncError),

    #[error("chunk cache: {0}")]
    Buffer(#[from] BufferError),

    #[error("http client: {0}")]
    Http(String),
}

/// A running service.
pub struct ServiceHandle {
    shutdown: ShutdownHandle,
    store: ObjectStore,
    cache: ChunkCache,
    sync: watch::Receiver<SyncSnapshot>,
}

impl ServiceHandle {
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn cache(&self) -> &ChunkCache {
        &self.cache
    }

    /// Status of the change sync task
    pub fn sync_status(&self) -> watch::Receiver<SyncSnapshot> {
        self.sync.clone()
    }

    /// Stop the background tasks, then close the metadata cache.
    pub async fn shutdown(self) {
        self.shutdown.shutdown().await;
        self.store.close().await;
    }
}

pub async fn open_store(config: &Config) -> Result<ObjectStore, ServiceError> {
    let store = ObjectStore::open(&config.db_path, config.blacklist.clone()).await?;
    // Fail fast on a damaged cursor instead of on the first sync tick
    store.get_cursor().await?;
    Ok(store)
}

pub fn http_client() -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .user_agent(concat!("nimbus/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ServiceError::Http(e.to_string()))
}

/// Build the authorized remote client from the stored credential.
pub async fn connect_remote(
    config: &Config,
    store: &ObjectStore,
) -> Result<Arc<dyn RemoteApi>, ServiceError> {
    let credential = match store.get_credential().await {
        Ok(credential) => credential,
        Err(e) if e.is_not_found() => return Err(ServiceError::MissingCredential),
        Err(e) => return Err(e.into()),
    };

    let http = http_client()?;
    let tokens = TokenSource::new(config.oauth.clone(), http.clone(), store.clone(), credential);
    Ok(Arc::new(DriveClient::new(
        http,
        config.api_url.clone(),
        Arc::new(tokens),
    )))
}

pub async fn start_service(config: &Config) -> Result<ServiceHandle, ServiceError> {
    let store = open_store(config).await?;
    let remote = connect_remote(config, &store).await?;
    start_with_remote(config, store, remote).await
}

/// Start the service against an already connected remote.
pub async fn start_with_remote(
    config: &Config,
    store: ObjectStore,
    remote: Arc<dyn RemoteApi>,
) -> Result<ServiceHandle, ServiceError> {
    let engine = Arc::new(ChangeSyncEngine::new(
        remote.clone(),
        store.clone(),
        config.page_size,
    ));

    match engine.bootstrap_root().await {
        Ok(root) => info!(id = %root.id, name = %root.name, "root folder ready"),
        // A previously stored root is good enough to start serving lookups
        Err(e) if !e.is_auth() && store.root_id().await.is_ok() => {
            warn!(error = %e, "could not refresh root folder, using cached one")
        }
        Err(e) => return Err(e.into()),
    }

    let cache = ChunkCache::new(&config.chunk_dir, config.chunk_size, remote)?;
    let sync = engine.subscribe();

    let shutdown = Scheduler::new()
        .with_task(Arc::new(ChangeSyncTask::new(engine, config.poll_interval)))
        .with_task(Arc::new(ChunkReaperTask::new(
            &config.chunk_dir,
            config.reap_interval,
        )))
        .start();

    info!(
        db = ?config.db_path,
        chunks = ?config.chunk_dir,
        chunk_size = config.chunk_size,
        poll_interval = ?config.poll_interval,
        reap_interval = ?config.reap_interval,
        "service started"
    );

    Ok(ServiceHandle {
        shutdown,
        store,
        cache,
        sync,
    })
}

/// Run the service until ctrl-c.
pub async fn spawn_service(config: &Config) -> Result<(), ServiceError> {
    let handle = start_service(config).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for ctrl-c, shutting down");
    }

    info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
