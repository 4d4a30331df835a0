//! OAuth2 token handling for the remote API.

use chrono::{Duration as ChronoDuration, Utc};
use common::{Credential, RemoteError};
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.google.com/o/oauth2/token";
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
/// Out-of-band redirect: the consent page shows the code to paste back
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Refresh this long before the stated expiry
const EXPIRY_LEEWAY_SECS: i64 = 60;

/// OAuth client registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: Url,
    pub token_url: Url,
}

impl OAuthConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: Url::parse(DEFAULT_AUTH_URL).expect("valid default auth url"),
            token_url: Url::parse(DEFAULT_TOKEN_URL).expect("valid default token url"),
        }
    }

    /// Consent page the operator opens to authorize offline access
    pub fn consent_url(&self) -> Url {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", OOB_REDIRECT_URI)
            .append_pair("response_type", "code")
            .append_pair("scope", DRIVE_SCOPE)
            .append_pair("access_type", "offline")
            .append_pair("state", "state-token");
        url
    }

    /// Trade an authorization code for a credential
    pub async fn exchange_code(
        &self,
        http: &reqwest::Client,
        code: &str,
    ) -> Result<Credential, RemoteError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code.trim()),
            ("redirect_uri", OOB_REDIRECT_URI),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let response = self.token_request(http, &params).await?;
        Ok(response.into_credential(None))
    }

    /// Mint a new access token from a refresh token
    pub async fn refresh(
        &self,
        http: &reqwest::Client,
        refresh_token: &str,
    ) -> Result<Credential, RemoteError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let response = self.token_request(http, &params).await?;
        Ok(response.into_credential(Some(refresh_token)))
    }

    async fn token_request(
        &self,
        http: &reqwest::Client,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, RemoteError> {
        let response = http
            .post(self.token_url.clone())
            .form(params)
            .send()
            .await
            .map_err(super::transport_error)?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Auth(format!(
                "token endpoint rejected request ({status}): {body}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    /// Refresh responses usually omit the refresh token; keep the old one.
    fn into_credential(self, previous_refresh: Option<&str>) -> Credential {
        Credential {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string)),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expiry: self
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        }
    }
}

/// Hands out valid credentials, refreshing and re-persisting as needed.
pub struct TokenSource {
    oauth: OAuthConfig,
    http: reqwest::Client,
    store: ObjectStore,
    current: Mutex<Credential>,
}

impl TokenSource {
    pub fn new(
        oauth: OAuthConfig,
        http: reqwest::Client,
        store: ObjectStore,
        credential: Credential,
    ) -> Self {
        Self {
            oauth,
            http,
            store,
            current: Mutex::new(credential),
        }
    }

    /// A credential that is not known to be expired
    pub async fn token(&self) -> Result<Credential, RemoteError> {
        let mut current = self.current.lock().await;
        let leeway = ChronoDuration::seconds(EXPIRY_LEEWAY_SECS);
        if current.is_expired(Utc::now(), leeway) {
            tracing::debug!("access token expired, refreshing");
            *current = self.refresh(&current).await?;
        }
        Ok(current.clone())
    }

    /// Refresh after the remote rejected `stale`
    ///
    /// If another request already replaced `stale`, the newer credential is
    /// returned without a second refresh.
    pub async fn force_refresh(&self, stale: &Credential) -> Result<Credential, RemoteError> {
        let mut current = self.current.lock().await;
        if current.access_token != stale.access_token {
            return Ok(current.clone());
        }
        *current = self.refresh(&current).await?;
        Ok(current.clone())
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential, RemoteError> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .filter(|_| credential.can_refresh())
            .ok_or_else(|| RemoteError::Auth("no refresh token stored".to_string()))?;

        let fresh = self.oauth.refresh(&self.http, refresh_token).await?;
        if let Err(e) = self.store.set_credential(&fresh).await {
            tracing::warn!(error = %e, "could not persist refreshed credential");
        }
        tracing::info!(expiry = ?fresh.expiry, "access token refreshed");
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consent_url_requests_offline_access() {
        let oauth = OAuthConfig::new("client-123", "secret");
        let url = oauth.consent_url();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["redirect_uri"], OOB_REDIRECT_URI);
        assert_eq!(pairs["scope"], DRIVE_SCOPE);
        assert!(!pairs.contains_key("client_secret"));
    }

    #[test]
    fn test_refresh_response_keeps_refresh_token() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"new","expires_in":3600}"#).unwrap();
        let credential = response.into_credential(Some("old-refresh"));

        assert_eq!(credential.access_token, "new");
        assert_eq!(credential.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(credential.token_type, "Bearer");
        assert!(!credential.is_expired(Utc::now(), ChronoDuration::seconds(60)));
    }

    #[tokio::test]
    async fn test_token_without_expiry_is_used_as_is() {
        let store = ObjectStore::in_memory(common::Blacklist::default())
            .await
            .unwrap();
        let credential = Credential {
            access_token: "live".to_string(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expiry: None,
        };
        let source = TokenSource::new(
            OAuthConfig::new("id", "secret"),
            reqwest::Client::new(),
            store,
            credential.clone(),
        );

        assert_eq!(source.token().await.unwrap(), credential);
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_is_auth_error() {
        let store = ObjectStore::in_memory(common::Blacklist::default())
            .await
            .unwrap();
        let credential = Credential {
            access_token: "dead".to_string(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expiry: Some(Utc::now() - ChronoDuration::seconds(5)),
        };
        let source = TokenSource::new(
            OAuthConfig::new("id", "secret"),
            reqwest::Client::new(),
            store,
            credential,
        );

        assert!(source.token().await.unwrap_err().is_auth());
    }
}
