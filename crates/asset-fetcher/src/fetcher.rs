//! HTTP download of asset bytes

use std::time::Duration;

use asset_cache::{AssetKind, BoxError, FetchBytes};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::error::{FetchError, Result};
use crate::types::{endpoint_path, FetcherConfig, TOKEN_HEADER};

/// Downloads one kind of asset from the REST API
pub struct HttpAssetFetcher {
    client: Client,
    kind: AssetKind,
    config: FetcherConfig,
}

impl HttpAssetFetcher {
    pub fn new(kind: AssetKind, config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            kind,
            config,
        })
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    /// Full download URL for an asset key
    pub fn download_url(&self, key: &str) -> String {
        format!(
            "{}{}?url={}",
            self.config.api_base_url,
            endpoint_path(self.kind),
            urlencoding::encode(key)
        )
    }

    /// Download the raw bytes behind `key`
    pub async fn download(&self, key: &str) -> Result<Bytes> {
        let url = self.download_url(key);
        debug!(kind = %self.kind, url = %url, "Downloading asset");

        let mut request = self.client.post(&url);
        if let Some(token) = &self.config.auth_token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(kind = %self.kind, status = %status, url = %url, "Asset download failed");
            return Err(classify_status(status));
        }

        let data = response.bytes().await?;
        debug!(kind = %self.kind, size = data.len(), "Downloaded asset");
        Ok(data)
    }
}

#[async_trait]
impl FetchBytes for HttpAssetFetcher {
    async fn fetch_bytes(&self, key: &str) -> std::result::Result<Bytes, BoxError> {
        Ok(self.download(key).await?)
    }
}

/// Map a non-success status to an error
pub fn classify_status(status: StatusCode) -> FetchError {
    match status {
        StatusCode::UNAUTHORIZED => FetchError::Unauthorized,
        StatusCode::FORBIDDEN => FetchError::Forbidden,
        StatusCode::NOT_FOUND => FetchError::NotFound,
        other => FetchError::Status(other.as_u16()),
    }
}
