//! OAuth credential persisted between runs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Token material for authorizing requests against the remote API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    /// Long-lived token used to mint new access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// When the access token stops being accepted, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Credential {
    /// Whether the access token is expired (or will be within `leeway`) at `now`
    ///
    /// Tokens without a known expiry are assumed valid; the transport refreshes
    /// them on a 401 instead.
    pub fn is_expired(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        match self.expiry {
            Some(expiry) => expiry - leeway <= now,
            None => false,
        }
    }

    /// Whether a refresh can be attempted
    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }

    /// Value for the `Authorization` header
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}
