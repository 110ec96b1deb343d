use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::{CacheEntry, StoreStats};

/// A durable key/blob table with per-entry timestamps
///
/// Holds at most one entry per key; writing an existing key replaces it.
/// Readers never observe a partially written entry.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Look up the entry for `key`.
    ///
    /// A missing key is `None`, and so is a store that cannot be read.
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Upsert `payload` under `key` with an explicit timestamp
    async fn put_at(&self, key: &str, payload: Bytes, stored_at: DateTime<Utc>) -> Result<()>;

    /// Upsert `payload` under `key`, stamped with the current time
    async fn put(&self, key: &str, payload: Bytes) -> Result<()> {
        self.put_at(key, payload, Utc::now()).await
    }

    /// Remove the entry for `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every entry
    async fn clear(&self) -> Result<()>;

    /// Stream every current entry.
    ///
    /// The stream is lazy and finite. Calling `entries` again starts a fresh
    /// pass over the store.
    fn entries(&self) -> BoxStream<'_, Result<CacheEntry>>;

    /// Number of entries and the sum of their payload sizes
    async fn stats(&self) -> Result<StoreStats>;
}
