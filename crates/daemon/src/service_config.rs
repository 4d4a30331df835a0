use std::path::PathBuf;
use std::time::Duration;

use common::Blacklist;
use url::Url;

use crate::remote::OAuthConfig;
use crate::state::AppState;

/// Everything a running service needs, resolved from `config.toml` and
/// command-line overrides.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite metadata cache
    pub db_path: PathBuf,
    pub chunk_dir: PathBuf,
    pub chunk_size: u64,
    pub poll_interval: Duration,
    pub reap_interval: Duration,
    pub page_size: u32,
    pub blacklist: Blacklist,
    pub api_url: Url,
    pub oauth: OAuthConfig,
}

impl Config {
    pub fn from_state(state: &AppState) -> Self {
        let config = &state.config;
        Self {
            db_path: state.db_path.clone(),
            chunk_dir: state.chunk_dir(None),
            chunk_size: config.chunk_size,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            reap_interval: Duration::from_secs(config.reap_interval_secs),
            page_size: config.page_size,
            blacklist: Blacklist::new(config.blacklist.iter().cloned()),
            api_url: config.api_url.clone(),
            oauth: state.oauth(),
        }
    }
}
