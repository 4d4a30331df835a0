use std::fmt;

use clap::Args;
use comfy_table::Table;

use common::RemoteObject;
use nimbus_daemon::lookup::resolve_path;
use nimbus_daemon::state::{AppState, StateError};
use nimbus_daemon::ServiceConfig;
use object_store::{ObjectStore, StoreError};

/// List a folder from the local metadata cache
#[derive(Args, Debug, Clone)]
pub struct Ls {
    /// Path below the root folder (defaults to the root)
    #[arg(default_value = "/")]
    pub path: String,
}

#[derive(Debug)]
pub struct LsOutput {
    pub items: Vec<RemoteObject>,
}

impl fmt::Display for LsOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.items.is_empty() {
            return write!(f, "No items found");
        }

        let mut table = Table::new();
        table.set_header(vec!["TYPE", "NAME", "SIZE", "MODIFIED", "ID"]);
        for item in &self.items {
            let type_str = if item.is_dir { "dir" } else { "file" };
            table.add_row(vec![
                type_str.to_string(),
                item.name.clone(),
                item.size.to_string(),
                item.last_modified.format("%Y-%m-%d %H:%M:%S").to_string(),
                item.id.clone(),
            ]);
        }
        write!(f, "{table}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("metadata cache: {0}")]
    Store(#[from] StoreError),

    #[error("no such path: {0}")]
    NotFound(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Ls {
    type Error = LsError;
    type Output = LsOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let config = ServiceConfig::from_state(&state);
        let store = ObjectStore::open(&config.db_path, config.blacklist.clone()).await?;

        let root_id = store.root_id().await.map_err(|e| {
            if e.is_not_found() {
                LsError::NotFound("root folder (has the daemon run yet?)".into())
            } else {
                e.into()
            }
        })?;
        let target = resolve_path(&store, &root_id, &self.path)
            .await?
            .ok_or_else(|| LsError::NotFound(self.path.clone()))?;

        let items = if target.is_dir {
            store.list_children(&target.id).await?
        } else {
            vec![target]
        };
        store.close().await;

        Ok(LsOutput { items })
    }
}
