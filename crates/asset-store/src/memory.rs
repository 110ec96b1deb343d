//! Process-lifetime store backend

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::store::BlobStore;
use crate::types::{truncate_to_millis, CacheEntry, StoreStats};

/// A [`BlobStore`] that keeps entries in memory.
///
/// Used when persistent storage is disabled, and in tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().await.get(key).cloned()
    }

    async fn put_at(&self, key: &str, payload: Bytes, stored_at: DateTime<Utc>) -> Result<()> {
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            stored_at: truncate_to_millis(stored_at),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    fn entries(&self) -> BoxStream<'_, Result<CacheEntry>> {
        // Snapshot on first poll so the lock is not held across the caller's awaits
        stream::once(async move {
            let snapshot: Vec<CacheEntry> = self.entries.read().await.values().cloned().collect();
            stream::iter(snapshot.into_iter().map(Ok))
        })
        .flatten()
        .boxed()
    }

    async fn stats(&self) -> Result<StoreStats> {
        let entries = self.entries.read().await;
        Ok(StoreStats {
            count: entries.len(),
            total_bytes: entries.values().map(CacheEntry::size).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryBlobStore::new();
        store
            .put("avatar/1.png", Bytes::from_static(b"png bytes"))
            .await
            .unwrap();

        let entry = store.get("avatar/1.png").await.unwrap();
        assert_eq!(entry.key, "avatar/1.png");
        assert_eq!(&entry.payload[..], b"png bytes");
        assert!(store.get("avatar/2.png").await.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryBlobStore::new();
        let earlier = Utc::now() - Duration::days(3);
        store
            .put_at("k", Bytes::from_static(b"old"), earlier)
            .await
            .unwrap();
        store.put("k", Bytes::from_static(b"newer")).await.unwrap();

        let entry = store.get("k").await.unwrap();
        assert_eq!(&entry.payload[..], b"newer");
        assert!(entry.stored_at > earlier);
        assert_eq!(store.stats().await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_delete_clear_and_stats() {
        let store = MemoryBlobStore::new();
        store.put("a", Bytes::from_static(b"1234")).await.unwrap();
        store.put("b", Bytes::from_static(b"56")).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats, StoreStats { count: 2, total_bytes: 6 });

        store.delete("a").await.unwrap();
        store.delete("missing").await.unwrap();
        assert!(store.get("a").await.is_none());

        store.clear().await.unwrap();
        assert_eq!(store.stats().await.unwrap(), StoreStats::default());
    }

    #[tokio::test]
    async fn test_entries_is_restartable() {
        let store = MemoryBlobStore::new();
        store.put("a", Bytes::from_static(b"1")).await.unwrap();
        store.put("b", Bytes::from_static(b"2")).await.unwrap();

        let first: Vec<CacheEntry> = store.entries().try_collect().await.unwrap();
        let second: Vec<CacheEntry> = store.entries().try_collect().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
    }
}
