use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use drivefs_config::{DriveFsConfig, MAX_PAGE_SIZE};

use crate::auth::TokenStore;
use crate::client::{AccountInfo, ChangePage, FilePage, RemoteSyncClient};
use crate::error::SyncError;

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/drive/v2";

/// Fields requested for every file; keeps listing responses small.
const FILE_FIELDS: &str = "id,title,mimeType,fileSize,parents(id,isRoot),\
lastViewedByMeDate,modifiedDate,createdDate,labels/trashed";

/// Drive v2 REST client.
pub struct DriveClient {
    client: Client,
    tokens: Arc<TokenStore>,
    api_base: String,
    page_size: u32,
    include_trashed: bool,
}

impl DriveClient {
    pub fn new(tokens: Arc<TokenStore>) -> Result<Self, SyncError> {
        let client = Client::builder()
            .build()
            .map_err(|e| SyncError::Auth(format!("Failed to create HTTP client: {}", e)))?;
        Ok(DriveClient {
            client,
            tokens,
            api_base: DEFAULT_API_BASE.to_string(),
            page_size: MAX_PAGE_SIZE,
            include_trashed: false,
        })
    }

    /// Build a client from the `account` and `sync` config sections.
    pub fn from_config(config: &DriveFsConfig, tokens: Arc<TokenStore>) -> Result<Self, SyncError> {
        let mut client = DriveClient::new(tokens)?
            .with_page_size(config.sync.page_size())
            .with_include_trashed(config.sync.include_trashed);
        if let Some(base) = &config.account.api_base {
            client = client.with_api_base(base);
        }
        Ok(client)
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_include_trashed(mut self, include_trashed: bool) -> Self {
        self.include_trashed = include_trashed;
        self
    }

    fn files_url(&self, page_token: Option<&str>) -> String {
        let mut url = format!(
            "{}/files?maxResults={}&fields={}",
            self.api_base,
            self.page_size,
            urlencoding::encode(&format!("nextPageToken,items({})", FILE_FIELDS)),
        );
        if !self.include_trashed {
            url.push_str("&q=");
            url.push_str(&urlencoding::encode("trashed=false"));
        }
        if let Some(token) = page_token {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }

    fn changes_url(&self, start_change_id: u64, page_token: Option<&str>) -> String {
        let mut url = format!(
            "{}/changes?maxResults={}&startChangeId={}&includeDeleted=true&fields={}",
            self.api_base,
            self.page_size,
            start_change_id,
            urlencoding::encode(&format!(
                "nextPageToken,largestChangeId,items(id,fileId,deleted,file({}))",
                FILE_FIELDS
            )),
        );
        if let Some(token) = page_token {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }

    /// GET a JSON document with the bearer token, refreshing and retrying
    /// once if the token is rejected.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SyncError> {
        let token = self.tokens.access_token().await?;
        let mut response = self.client.get(url).bearer_auth(&token).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("access token rejected, refreshing");
            let token = self.tokens.refresh().await?;
            response = self.client.get(url).bearer_auth(&token).send().await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(SyncError::Unauthorized);
            }
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RemoteSyncClient for DriveClient {
    async fn about(&self) -> Result<AccountInfo, SyncError> {
        let url = format!(
            "{}/about?fields={}",
            self.api_base,
            urlencoding::encode("rootFolderId,largestChangeId")
        );
        self.get_json(&url).await
    }

    async fn list_files(&self, page_token: Option<&str>) -> Result<FilePage, SyncError> {
        let page: FilePage = self.get_json(&self.files_url(page_token)).await?;
        debug!(items = page.items.len(), more = page.next_page_token.is_some(), "files page");
        Ok(page)
    }

    async fn list_changes(
        &self,
        start_change_id: u64,
        page_token: Option<&str>,
    ) -> Result<ChangePage, SyncError> {
        let page: ChangePage = self
            .get_json(&self.changes_url(start_change_id, page_token))
            .await?;
        debug!(
            start_change_id,
            items = page.items.len(),
            more = page.next_page_token.is_some(),
            "changes page"
        );
        Ok(page)
    }

    fn name(&self) -> &str {
        "drive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn client(include_trashed: bool) -> (TempDir, DriveClient) {
        let tmp = TempDir::new().unwrap();
        let tokens = TokenStore::load(tmp.path().join("c.json"), None, None)
            .await
            .unwrap();
        let client = DriveClient::new(Arc::new(tokens))
            .unwrap()
            .with_api_base("http://localhost:9/drive/v2/")
            .with_page_size(250)
            .with_include_trashed(include_trashed);
        (tmp, client)
    }

    #[tokio::test]
    async fn test_files_url() {
        let (_tmp, client) = client(false).await;
        let url = client.files_url(None);
        assert!(url.starts_with("http://localhost:9/drive/v2/files?maxResults=250"));
        assert!(url.contains("&q=trashed%3Dfalse"));
        assert!(!url.contains("pageToken"));

        let url = client.files_url(Some("tok/en"));
        assert!(url.ends_with("&pageToken=tok%2Fen"));
    }

    #[tokio::test]
    async fn test_files_url_with_trashed() {
        let (_tmp, client) = client(true).await;
        assert!(!client.files_url(None).contains("trashed%3Dfalse"));
    }

    #[tokio::test]
    async fn test_changes_url() {
        let (_tmp, client) = client(false).await;
        let url = client.changes_url(42, None);
        assert!(url.contains("startChangeId=42"));
        assert!(url.contains("includeDeleted=true"));
    }

    #[tokio::test]
    async fn test_page_size_clamped() {
        let (_tmp, client) = client(false).await;
        assert_eq!(client.with_page_size(50_000).page_size, MAX_PAGE_SIZE);
    }
}
