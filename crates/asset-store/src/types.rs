//! Store types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored asset: the payload plus the time it was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Bytes,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// Metadata written in front of every payload on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryHeader {
    pub key: String,
    /// Milliseconds since the Unix epoch
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub stored_at: DateTime<Utc>,
    pub size: u64,
}

/// Aggregate size of the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub count: usize,
    pub total_bytes: u64,
}

/// Timestamps are persisted with millisecond precision. Both backends
/// normalize on write so an entry reads back exactly as it was stored.
pub(crate) fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}
