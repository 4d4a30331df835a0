use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::{ChangePage, RemoteApi, RemoteError, RemoteFile};
use reqwest::header::{AUTHORIZATION, RANGE};
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::debug;
use url::Url;

use super::auth::TokenSource;
use super::transport_error;

pub const DEFAULT_API_URL: &str = "https://www.googleapis.com/drive/v2/";

/// Drive v2 REST client.
pub struct DriveClient {
    http: reqwest::Client,
    api_url: Url,
    tokens: Arc<TokenSource>,
}

impl DriveClient {
    pub fn new(http: reqwest::Client, mut api_url: Url, tokens: Arc<TokenSource>) -> Self {
        // Url::join drops the last path segment unless it ends in a slash
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }
        Self {
            http,
            api_url,
            tokens,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        self.api_url
            .join(path)
            .map_err(|e| RemoteError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    fn changes_url(
        &self,
        start_change_id: Option<u64>,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<Url, RemoteError> {
        let mut url = self.endpoint("changes")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("includeDeleted", "true")
                .append_pair("maxResults", &max_results.to_string());
            if let Some(start) = start_change_id {
                query.append_pair("startChangeId", &start.to_string());
            }
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    /// Send an authorized request, refreshing the token once on a 401.
    async fn send<F>(&self, build: F) -> Result<Response, RemoteError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder + Send + Sync,
    {
        let credential = self.tokens.token().await?;
        let response = build(&self.http)
            .header(AUTHORIZATION, credential.authorization_header())
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        debug!("request unauthorized, refreshing access token");
        let credential = self.tokens.force_refresh(&credential).await?;
        let response = build(&self.http)
            .header(AUTHORIZATION, credential.authorization_header())
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(RemoteError::Auth(
                "remote rejected a freshly refreshed credential".to_string(),
            ));
        }
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

fn decode_error(e: reqwest::Error) -> RemoteError {
    RemoteError::Decode(e.to_string())
}

#[async_trait]
impl RemoteApi for DriveClient {
    async fn changes(
        &self,
        start_change_id: Option<u64>,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<ChangePage, RemoteError> {
        let url = self.changes_url(start_change_id, page_token, max_results)?;
        let response = self.send(|http| http.get(url.clone())).await?;
        response.json::<ChangePage>().await.map_err(decode_error)
    }

    async fn root(&self) -> Result<RemoteFile, RemoteError> {
        let url = self.endpoint("files/root")?;
        let response = self.send(|http| http.get(url.clone())).await?;
        let mut root = response.json::<RemoteFile>().await.map_err(decode_error)?;

        // Some roots report no size; ask the content endpoint instead
        if !root.is_folder() && root.file_size.unwrap_or(0) == 0 {
            if let Some(download_url) = root.download_url.clone() {
                let response = self.send(|http| http.get(download_url.as_str())).await?;
                root.file_size = response.content_length();
            }
        }

        Ok(root)
    }

    async fn download_range(
        &self,
        download_ref: &str,
        range: Range<u64>,
    ) -> Result<Bytes, RemoteError> {
        if range.is_empty() {
            return Ok(Bytes::new());
        }

        let url = Url::parse(download_ref)
            .map_err(|e| RemoteError::Transport(format!("invalid download ref: {e}")))?;
        let header = format!("bytes={}-{}", range.start, range.end - 1);

        let response = self
            .send(|http| http.get(url.clone()).header(RANGE, header.as_str()))
            .await?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;

        // A 200 carries the whole object: the server ignored the range
        if status == StatusCode::OK && bytes.len() as u64 > range.end - range.start {
            let start = (range.start as usize).min(bytes.len());
            let end = (range.end as usize).min(bytes.len());
            return Ok(bytes.slice(start..end));
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use common::{Blacklist, Credential};
    use object_store::ObjectStore;

    use super::*;
    use crate::remote::OAuthConfig;

    async fn client(api_url: &str) -> DriveClient {
        let store = ObjectStore::in_memory(Blacklist::default()).await.unwrap();
        let credential = Credential {
            access_token: "token".to_string(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expiry: None,
        };
        let http = reqwest::Client::new();
        let tokens = TokenSource::new(
            OAuthConfig::new("id", "secret"),
            http.clone(),
            store,
            credential,
        );
        DriveClient::new(http, Url::parse(api_url).unwrap(), Arc::new(tokens))
    }

    #[tokio::test]
    async fn test_api_url_without_trailing_slash() {
        let client = client("https://drive.example/drive/v2").await;
        assert_eq!(
            client.endpoint("files/root").unwrap().as_str(),
            "https://drive.example/drive/v2/files/root"
        );
    }

    #[tokio::test]
    async fn test_first_page_omits_start_id() {
        let client = client(DEFAULT_API_URL).await;
        let url = client.changes_url(None, None, 1000).unwrap();
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/drive/v2/changes");
        assert_eq!(query["includeDeleted"], "true");
        assert_eq!(query["maxResults"], "1000");
        assert!(!query.contains_key("startChangeId"));
        assert!(!query.contains_key("pageToken"));
    }

    #[tokio::test]
    async fn test_resumed_page_carries_cursor_and_token() {
        let client = client(DEFAULT_API_URL).await;
        let url = client.changes_url(Some(1006), Some("tok"), 50).unwrap();
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(query["startChangeId"], "1006");
        assert_eq!(query["pageToken"], "tok");
        assert_eq!(query["maxResults"], "50");
    }
}
