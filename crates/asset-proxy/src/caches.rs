//! One asset cache per kind, sharing a handle registry

use crate::error::Result;
use crate::types::{ProxyConfig, StatsResponse};
use asset_cache::{AssetCache, AssetKind, CacheConfig, FetchBytes, HandleRegistry};
use asset_fetcher::{FetcherConfig, HttpAssetFetcher};
use asset_store::{BlobStore, FileBlobStore, MemoryBlobStore};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub struct AssetCaches {
    pub avatars: AssetCache,
    pub post_images: AssetCache,
    pub handles: Arc<HandleRegistry>,
}

impl AssetCaches {
    /// Build both caches from a store and fetcher per kind
    pub fn assemble(
        ttl_secs: u64,
        mut parts: impl FnMut(AssetKind) -> (Arc<dyn BlobStore>, Arc<dyn FetchBytes>),
    ) -> Self {
        let handles = Arc::new(HandleRegistry::new());
        let mut build = |kind: AssetKind| {
            let (store, fetcher) = parts(kind);
            AssetCache::new(
                CacheConfig::new(kind).with_ttl_secs(ttl_secs),
                store,
                fetcher,
                Arc::clone(&handles),
            )
        };
        let avatars = build(AssetKind::Avatar);
        let post_images = build(AssetKind::PostImage);

        Self {
            avatars,
            post_images,
            handles,
        }
    }

    /// File stores under `<cache_dir>/<kind>` (or memory stores) and HTTP
    /// fetchers against the configured API
    pub async fn from_config(config: &ProxyConfig) -> Result<Self> {
        let mut fetcher_config = FetcherConfig::new(config.api_base_url.as_str())
            .with_timeout_secs(config.fetch_timeout_secs);
        if let Some(token) = &config.auth_token {
            fetcher_config = fetcher_config.with_auth_token(token.as_str());
        }

        let avatar_store = open_store(config.cache_dir.as_deref(), AssetKind::Avatar).await;
        let post_store = open_store(config.cache_dir.as_deref(), AssetKind::PostImage).await;
        let avatar_fetcher: Arc<dyn FetchBytes> = Arc::new(HttpAssetFetcher::new(
            AssetKind::Avatar,
            fetcher_config.clone(),
        )?);
        let post_fetcher: Arc<dyn FetchBytes> =
            Arc::new(HttpAssetFetcher::new(AssetKind::PostImage, fetcher_config)?);

        Ok(Self::assemble(config.cache_ttl_secs, |kind| match kind {
            AssetKind::Avatar => (Arc::clone(&avatar_store), Arc::clone(&avatar_fetcher)),
            AssetKind::PostImage => (Arc::clone(&post_store), Arc::clone(&post_fetcher)),
        }))
    }

    pub fn get(&self, kind: AssetKind) -> &AssetCache {
        match kind {
            AssetKind::Avatar => &self.avatars,
            AssetKind::PostImage => &self.post_images,
        }
    }

    /// Startup expiry sweep for every kind
    pub async fn sweep_on_start(&self) {
        for kind in AssetKind::ALL {
            self.get(kind).sweep_on_start().await;
        }
    }

    pub async fn stats(&self) -> Result<StatsResponse> {
        Ok(StatsResponse {
            avatar: self.avatars.stats().await?,
            post_image: self.post_images.stats().await?,
            handles: self.handles.stats(),
        })
    }
}

async fn open_store(cache_dir: Option<&Path>, kind: AssetKind) -> Arc<dyn BlobStore> {
    match cache_dir {
        Some(dir) => {
            let dir = dir.join(kind.as_str());
            info!(kind = %kind, dir = %dir.display(), "Using file store");
            Arc::new(FileBlobStore::open(dir).await)
        }
        None => {
            info!(kind = %kind, "Using in-memory store");
            Arc::new(MemoryBlobStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_from_config_uses_one_dir_per_kind() {
        let dir = tempdir().unwrap();
        let config = ProxyConfig {
            cache_dir: Some(dir.path().to_path_buf()),
            ..ProxyConfig::default()
        };

        let caches = AssetCaches::from_config(&config).await.unwrap();
        assert_eq!(caches.get(AssetKind::Avatar).kind(), AssetKind::Avatar);
        assert_eq!(caches.get(AssetKind::PostImage).kind(), AssetKind::PostImage);
        assert!(dir.path().join("avatar").is_dir());
        assert!(dir.path().join("post-image").is_dir());
    }

    #[tokio::test]
    async fn test_from_config_shares_handle_registry() {
        let config = ProxyConfig {
            cache_dir: None,
            cache_ttl_secs: 60,
            ..ProxyConfig::default()
        };

        let caches = AssetCaches::from_config(&config).await.unwrap();
        assert!(Arc::ptr_eq(caches.avatars.handles(), &caches.handles));
        assert!(Arc::ptr_eq(caches.post_images.handles(), &caches.handles));
        assert_eq!(caches.avatars.config().ttl_secs, 60);

        let stats = caches.stats().await.unwrap();
        assert_eq!(stats.avatar.count, 0);
        assert_eq!(stats.handles.live, 0);
    }
}
