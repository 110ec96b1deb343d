use async_trait::async_trait;
use bytes::Bytes;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Upstream download of an asset's raw bytes.
///
/// Implementations handle transport and authentication. Any error is treated
/// by the cache as a failed fetch for that key.
#[async_trait]
pub trait FetchBytes: Send + Sync {
    async fn fetch_bytes(&self, key: &str) -> Result<Bytes, BoxError>;
}
