//! Fetcher configuration

use asset_cache::AssetKind;

/// Header carrying the session token
pub const TOKEN_HEADER: &str = "satoken";

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Download endpoint for an asset kind, relative to the API base URL
pub fn endpoint_path(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Avatar => "/auth/downLoadAvatar",
        AssetKind::PostImage => "/review/downLoadPicture",
    }
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Base URL of the REST API, without a trailing slash
    pub api_base_url: String,
    /// Session token, sent when present
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
}

impl FetcherConfig {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}
