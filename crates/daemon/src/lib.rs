//! nimbus daemon: keeps a local metadata cache in step with the remote
//! change feed and serves file content through an on-disk chunk cache.

pub mod buffer;
pub mod lookup;
pub mod process;
pub mod reaper;
pub mod remote;
pub mod scheduler;
pub mod service_config;
pub mod state;
pub mod sync;

pub use process::{spawn_service, start_service, start_with_remote, ServiceError, ServiceHandle};
pub use scheduler::ShutdownHandle;
pub use service_config::Config as ServiceConfig;
pub use state::{AppConfig, AppState, StateError};
