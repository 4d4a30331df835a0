use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;
use tokio::io::{AsyncBufReadExt, BufReader};

use common::RemoteError;
use nimbus_daemon::process::{http_client, ServiceError};
use nimbus_daemon::state::{AppState, StateError};
use object_store::{ObjectStore, StoreError};

#[derive(Args, Debug, Clone)]
pub struct Auth {
    /// Authorization code from the consent page; prompted for when omitted
    #[arg(long)]
    pub code: Option<String>,
}

#[derive(Debug)]
pub struct AuthOutput {
    pub expiry: Option<chrono::DateTime<chrono::Utc>>,
    pub can_refresh: bool,
}

impl fmt::Display for AuthOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} credential stored", "Authorized".green().bold())?;
        let expiry = match self.expiry {
            Some(expiry) => expiry.to_rfc3339(),
            None => "unknown".to_string(),
        };
        writeln!(f, "  {} {}", "Expires:".dimmed(), expiry)?;
        let refresh = if self.can_refresh {
            "yes".green().to_string()
        } else {
            "no (re-run `nimbus auth` when it expires)".yellow().to_string()
        };
        write!(f, "  {} {}", "Refreshable:".dimmed(), refresh)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("client_id is empty in config.toml")]
    MissingClient,

    #[error("could not read authorization code: {0}")]
    Prompt(#[from] std::io::Error),

    #[error("no authorization code entered")]
    EmptyCode,

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("code exchange failed: {0}")]
    Exchange(#[from] RemoteError),

    #[error("could not store credential: {0}")]
    Store(#[from] StoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Auth {
    type Error = AuthError;
    type Output = AuthOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        if state.config.client_id.is_empty() {
            return Err(AuthError::MissingClient);
        }
        let oauth = state.oauth();

        let code = match &self.code {
            Some(code) => code.clone(),
            None => {
                eprintln!("Open this URL in a browser and authorize access:\n");
                eprintln!("  {}\n", oauth.consent_url().as_str().bold());
                eprint!("Paste the authorization code: ");
                let mut line = String::new();
                BufReader::new(tokio::io::stdin())
                    .read_line(&mut line)
                    .await?;
                line
            }
        };
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::EmptyCode);
        }

        let credential = oauth.exchange_code(&http_client()?, code).await?;

        let store = ObjectStore::open(&state.db_path, common::Blacklist::empty()).await?;
        store.set_credential(&credential).await?;
        store.close().await;
        tracing::info!(expiry = ?credential.expiry, "credential stored");

        Ok(AuthOutput {
            expiry: credential.expiry,
            can_refresh: credential.can_refresh(),
        })
    }
}
