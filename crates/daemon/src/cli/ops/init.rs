use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use nimbus_daemon::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// OAuth client id registered for this installation
    #[arg(long, env = "NIMBUS_CLIENT_ID")]
    pub client_id: String,

    /// OAuth client secret
    #[arg(long, env = "NIMBUS_CLIENT_SECRET")]
    pub client_secret: String,

    /// Bytes per cached chunk
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Chunk cache directory (default: <temp>/nimbus/chunks)
    #[arg(long)]
    pub chunk_dir: Option<PathBuf>,

    /// Names hidden from path lookup (repeatable; replaces the defaults)
    #[arg(long = "blacklist")]
    pub blacklist: Vec<String>,
}

#[derive(Debug)]
pub struct InitOutput {
    pub nimbus_dir: PathBuf,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub chunk_dir: PathBuf,
    pub chunk_size: u64,
    pub blacklist: Vec<String>,
}

impl fmt::Display for InitOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} nimbus at {}",
            "Initialized".green().bold(),
            self.nimbus_dir.display().to_string().bold()
        )?;
        writeln!(f, "  {} {}", "Database:".dimmed(), self.db_path.display())?;
        writeln!(f, "  {} {}", "Config:".dimmed(), self.config_path.display())?;
        writeln!(f, "  {} {}", "Chunks:".dimmed(), self.chunk_dir.display())?;
        writeln!(f, "  {} {}", "Chunk size:".dimmed(), self.chunk_size)?;
        writeln!(f, "  {} {}", "Blacklist:".dimmed(), self.blacklist.join(", "))?;
        write!(
            f,
            "Next: run {} to authorize access",
            "nimbus auth".bold()
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] nimbus_daemon::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = InitOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let defaults = AppConfig::default();
        let config = AppConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            chunk_dir: self.chunk_dir.clone(),
            blacklist: if self.blacklist.is_empty() {
                defaults.blacklist.clone()
            } else {
                self.blacklist.clone()
            },
            ..defaults
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;
        let chunk_dir = state.chunk_dir(None);

        Ok(InitOutput {
            nimbus_dir: state.nimbus_dir,
            db_path: state.db_path,
            config_path: state.config_path,
            chunk_dir,
            chunk_size: state.config.chunk_size,
            blacklist: state.config.blacklist,
        })
    }
}
