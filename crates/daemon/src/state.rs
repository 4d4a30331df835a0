//! On-disk application state: the config directory and `config.toml`.

use std::path::{Path, PathBuf};

use common::blacklist::DEFAULT_BLACKLIST;
use common::{DEFAULT_CHUNK_SIZE, DEFAULT_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::remote::{OAuthConfig, DEFAULT_API_URL};

pub const APP_NAME: &str = "nimbus";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "cache.db";
pub const CHUNKS_DIR_NAME: &str = "chunks";

/// Contents of `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// OAuth client registration
    pub client_id: String,
    pub client_secret: String,
    /// Base URL of the remote API
    pub api_url: Url,
    /// Bytes per cached chunk
    pub chunk_size: u64,
    /// Where chunks are cached (default: `<temp>/chunks`)
    pub chunk_dir: Option<PathBuf>,
    /// Seconds between change-feed polls
    pub poll_interval_secs: u64,
    /// Seconds between chunk directory sweeps
    pub reap_interval_secs: u64,
    /// Change entries requested per page
    pub page_size: u32,
    /// Names hidden from path lookup
    pub blacklist: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_url: Url::parse(DEFAULT_API_URL).expect("valid default api url"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_dir: None,
            poll_interval_secs: 300,
            reap_interval_secs: 60,
            page_size: DEFAULT_PAGE_SIZE,
            blacklist: DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AppConfig {
    fn validate(&self) -> Result<(), StateError> {
        if self.chunk_size == 0 {
            return Err(StateError::InvalidConfig("chunk_size must be positive".into()));
        }
        if self.poll_interval_secs == 0 || self.reap_interval_secs == 0 {
            return Err(StateError::InvalidConfig("intervals must be positive".into()));
        }
        if self.page_size == 0 {
            return Err(StateError::InvalidConfig("page_size must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("could not determine home directory")]
    NoHomeDirectory,

    #[error("nimbus is not initialized at {0} (run `nimbus init`)")]
    NotInitialized(PathBuf),

    #[error("nimbus is already initialized at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config.toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to write config.toml: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Resolved paths and loaded configuration.
#[derive(Debug, Clone)]
pub struct AppState {
    pub nimbus_dir: PathBuf,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub config: AppConfig,
}

impl AppState {
    /// The config directory: `custom` if given, else `~/.nimbus`.
    pub fn nimbus_dir(custom: Option<PathBuf>) -> Result<PathBuf, StateError> {
        match custom {
            Some(dir) => Ok(dir),
            None => dirs::home_dir()
                .map(|home| home.join(format!(".{APP_NAME}")))
                .ok_or(StateError::NoHomeDirectory),
        }
    }

    /// Create the config directory and write `config.toml`.
    pub fn init(custom: Option<PathBuf>, config: Option<AppConfig>) -> Result<Self, StateError> {
        let nimbus_dir = Self::nimbus_dir(custom)?;
        let config_path = nimbus_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Err(StateError::AlreadyInitialized(nimbus_dir));
        }

        let config = config.unwrap_or_default();
        config.validate()?;

        std::fs::create_dir_all(&nimbus_dir)?;
        std::fs::write(&config_path, toml::to_string_pretty(&config)?)?;
        tracing::info!(dir = ?nimbus_dir, "initialized config directory");

        Ok(Self {
            db_path: nimbus_dir.join(DB_FILE_NAME),
            nimbus_dir,
            config_path,
            config,
        })
    }

    /// Load an initialized config directory.
    pub fn load(custom: Option<PathBuf>) -> Result<Self, StateError> {
        let nimbus_dir = Self::nimbus_dir(custom)?;
        let config_path = nimbus_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::NotInitialized(nimbus_dir));
        }

        let config: AppConfig = toml::from_str(&std::fs::read_to_string(&config_path)?)?;
        config.validate()?;

        Ok(Self {
            db_path: nimbus_dir.join(DB_FILE_NAME),
            nimbus_dir,
            config_path,
            config,
        })
    }

    /// Chunk directory: `<temp>/chunks` when a temp dir is given, else the
    /// configured one, else under the system temp dir.
    pub fn chunk_dir(&self, temp_override: Option<&Path>) -> PathBuf {
        if let Some(temp) = temp_override {
            return temp.join(CHUNKS_DIR_NAME);
        }
        self.config.chunk_dir.clone().unwrap_or_else(|| {
            std::env::temp_dir()
                .join(APP_NAME)
                .join(CHUNKS_DIR_NAME)
        })
    }

    pub fn oauth(&self) -> OAuthConfig {
        OAuthConfig::new(&self.config.client_id, &self.config.client_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let custom = Some(dir.path().join("nimbus"));

        let config = AppConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            page_size: 500,
            ..AppConfig::default()
        };
        let created = AppState::init(custom.clone(), Some(config.clone())).unwrap();
        assert!(created.config_path.exists());

        let loaded = AppState::load(custom.clone()).unwrap();
        assert_eq!(loaded.config, config);
        assert_eq!(loaded.db_path, dir.path().join("nimbus").join(DB_FILE_NAME));

        assert!(matches!(
            AppState::init(custom, None),
            Err(StateError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn test_load_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().to_path_buf())),
            Err(StateError::NotInitialized(_))
        ));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            client_id = "abc"
            poll_interval_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.client_id, "abc");
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.blacklist.len(), DEFAULT_BLACKLIST.len());
    }

    #[test]
    fn test_chunk_dir_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = AppState::init(Some(dir.path().to_path_buf()), None).unwrap();

        assert_eq!(
            state.chunk_dir(Some(Path::new("/var/tmp"))),
            PathBuf::from("/var/tmp/chunks")
        );

        state.config.chunk_dir = Some(PathBuf::from("/srv/chunks"));
        assert_eq!(state.chunk_dir(None), PathBuf::from("/srv/chunks"));
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            chunk_size: 0,
            ..AppConfig::default()
        };
        assert!(matches!(
            AppState::init(Some(dir.path().to_path_buf()), Some(config)),
            Err(StateError::InvalidConfig(_))
        ));
    }
}
