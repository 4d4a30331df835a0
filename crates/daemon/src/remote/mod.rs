//! HTTP transport to the remote store
//!
//! [`DriveClient`] implements [`common::RemoteApi`] over the Drive v2 REST
//! surface. Authorization goes through a [`TokenSource`], which refreshes
//! expired credentials and writes them back to the object store.

mod auth;
mod drive;

pub use auth::{OAuthConfig, TokenSource, DRIVE_SCOPE, OOB_REDIRECT_URI};
pub use drive::{DriveClient, DEFAULT_API_URL};

use common::RemoteError;

pub(crate) fn transport_error(e: reqwest::Error) -> RemoteError {
    RemoteError::Transport(e.to_string())
}
