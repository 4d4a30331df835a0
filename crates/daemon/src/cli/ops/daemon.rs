use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use nimbus_daemon::state::{AppState, StateError};
use nimbus_daemon::{spawn_service, ServiceConfig, ServiceError};

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Bytes per cached chunk
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Temporary directory; chunks are cached in <temp>/chunks
    #[arg(long)]
    pub temp: Option<PathBuf>,

    /// Seconds between change-feed polls
    #[arg(long)]
    pub refresh_interval: Option<u64>,

    /// Seconds between chunk cache sweeps
    #[arg(long)]
    pub clear_chunk_interval: Option<u64>,
}

#[derive(Debug)]
pub struct DaemonOutput;

impl fmt::Display for DaemonOutput {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("{0} must be positive")]
    InvalidFlag(&'static str),

    #[error("daemon failed: {0}")]
    Service(#[from] ServiceError),
}

impl Daemon {
    fn config(&self, state: &AppState) -> Result<ServiceConfig, DaemonError> {
        let mut config = ServiceConfig::from_state(state);

        if let Some(temp) = &self.temp {
            config.chunk_dir = state.chunk_dir(Some(temp));
        }
        if let Some(size) = self.chunk_size {
            if size == 0 {
                return Err(DaemonError::InvalidFlag("--chunk-size"));
            }
            config.chunk_size = size;
        }
        if let Some(secs) = self.refresh_interval {
            if secs == 0 {
                return Err(DaemonError::InvalidFlag("--refresh-interval"));
            }
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.clear_chunk_interval {
            if secs == 0 {
                return Err(DaemonError::InvalidFlag("--clear-chunk-interval"));
            }
            config.reap_interval = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = DaemonOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let config = self.config(&state)?;
        spawn_service(&config).await?;
        Ok(DaemonOutput)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::init(Some(dir.path().to_path_buf()), None).unwrap();
        (dir, state)
    }

    #[test]
    fn test_flags_override_config() {
        let (_dir, state) = state();
        let daemon = Daemon {
            chunk_size: Some(1024),
            temp: Some(PathBuf::from("/scratch")),
            refresh_interval: Some(10),
            clear_chunk_interval: None,
        };

        let config = daemon.config(&state).unwrap();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.chunk_dir, PathBuf::from("/scratch/chunks"));
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(
            config.reap_interval,
            Duration::from_secs(state.config.reap_interval_secs)
        );
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let (_dir, state) = state();
        let daemon = Daemon {
            chunk_size: None,
            temp: None,
            refresh_interval: None,
            clear_chunk_interval: Some(0),
        };
        assert!(matches!(
            daemon.config(&state),
            Err(DaemonError::InvalidFlag("--clear-chunk-interval"))
        ));
    }
}
