//! File-based blob storage that survives restarts
//!
//! Each key maps to one file named after the SHA-256 of the key. A file holds
//! a magic tag, a little-endian header length, a JSON [`EntryHeader`] and the
//! raw payload. Writes land in a temporary file that is renamed over the
//! destination, so readers see either the old entry or the new one.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::store::BlobStore;
use crate::types::{truncate_to_millis, CacheEntry, EntryHeader, StoreStats};

const MAGIC: &[u8; 4] = b"ACB1";
const PREFIX_LEN: usize = 8;
const MAX_HEADER_LEN: usize = 64 * 1024;
const EXTENSION: &str = "blob";
const TMP_EXTENSION: &str = "tmp";

/// A [`BlobStore`] backed by one file per entry in a directory
pub struct FileBlobStore {
    /// Directory holding the entry files
    dir: PathBuf,
    /// False when the directory could not be created
    available: AtomicBool,
    /// Set once the unavailable state has been logged
    reported: AtomicBool,
    /// Disambiguates concurrent temporary files
    tmp_counter: AtomicU64,
}

impl FileBlobStore {
    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// Never fails: if the directory cannot be created the store stays
    /// unavailable and behaves as an empty store that rejects writes.
    pub async fn open(dir: impl Into<PathBuf>) -> Self {
        let store = Self {
            dir: dir.into(),
            available: AtomicBool::new(false),
            reported: AtomicBool::new(false),
            tmp_counter: AtomicU64::new(0),
        };

        match fs::create_dir_all(&store.dir).await {
            Ok(()) => {
                store.available.store(true, Ordering::Release);
                info!(dir = ?store.dir, "Blob store opened");
            }
            Err(e) => store.report_unavailable(&e),
        }

        store
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// File name for a key: hex SHA-256 plus the blob extension
    pub fn file_name(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{}.{}", hex::encode(hasher.finalize()), EXTENSION)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(Self::file_name(key))
    }

    fn tmp_path_for(&self, key: &str) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            "{}.{}.{}.{}",
            Self::file_name(key),
            std::process::id(),
            n,
            TMP_EXTENSION
        ))
    }

    fn report_unavailable(&self, err: &dyn std::fmt::Display) {
        if !self.reported.swap(true, Ordering::AcqRel) {
            warn!(dir = ?self.dir, error = %err, "Blob store unavailable, assets will not be persisted");
        }
    }

    fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(self.dir.display().to_string()))
        }
    }
}

fn is_entry_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(EXTENSION)
}

fn is_tmp_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(TMP_EXTENSION)
}

fn encode(header: &EntryHeader, payload: &[u8]) -> Result<Vec<u8>> {
    let header = serde_json::to_vec(header)?;
    let header_len = u32::try_from(header.len())
        .map_err(|_| StoreError::Corrupt("header too large".to_string()))?;

    let mut out = Vec::with_capacity(PREFIX_LEN + header.len() + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Parse the fixed prefix, returning the header length
fn parse_prefix(prefix: &[u8]) -> Result<usize> {
    if prefix.len() < PREFIX_LEN || &prefix[..4] != MAGIC {
        return Err(StoreError::Corrupt("bad magic".to_string()));
    }
    let len = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]) as usize;
    if len > MAX_HEADER_LEN {
        return Err(StoreError::Corrupt(format!("header length {} too large", len)));
    }
    Ok(len)
}

/// Decode a whole file into its header and payload
fn decode(raw: Bytes) -> Result<(EntryHeader, Bytes)> {
    let header_len = parse_prefix(&raw)?;
    let payload_start = PREFIX_LEN + header_len;
    if raw.len() < payload_start {
        return Err(StoreError::Corrupt("truncated header".to_string()));
    }

    let header: EntryHeader = serde_json::from_slice(&raw[PREFIX_LEN..payload_start])?;
    let payload = raw.slice(payload_start..);
    if payload.len() as u64 != header.size {
        return Err(StoreError::Corrupt(format!(
            "payload is {} bytes, header says {}",
            payload.len(),
            header.size
        )));
    }

    Ok((header, payload))
}

async fn read_entry(path: &Path) -> Result<CacheEntry> {
    let raw = Bytes::from(fs::read(path).await?);
    let (header, payload) = decode(raw)?;
    Ok(CacheEntry {
        key: header.key,
        payload,
        stored_at: header.stored_at,
    })
}

/// Read only the header, without loading the payload
async fn read_header(path: &Path) -> Result<EntryHeader> {
    let mut file = fs::File::open(path).await?;
    let mut prefix = [0u8; PREFIX_LEN];
    file.read_exact(&mut prefix).await?;
    let header_len = parse_prefix(&prefix)?;

    let mut header = vec![0u8; header_len];
    file.read_exact(&mut header).await?;
    Ok(serde_json::from_slice(&header)?)
}

fn is_not_found(err: &StoreError) -> bool {
    matches!(err, StoreError::Io(e) if e.kind() == ErrorKind::NotFound)
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        if !self.is_available() {
            return None;
        }

        let path = self.path_for(key);
        match read_entry(&path).await {
            Ok(entry) if entry.key == key => Some(entry),
            Ok(entry) => {
                warn!(key, stored_key = %entry.key, "Stored blob belongs to another key");
                None
            }
            Err(e) if is_not_found(&e) => None,
            Err(StoreError::Corrupt(msg)) => {
                warn!(key, error = %msg, "Corrupt stored blob, removing");
                let _ = fs::remove_file(&path).await;
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to read stored blob");
                None
            }
        }
    }

    async fn put_at(&self, key: &str, payload: Bytes, stored_at: DateTime<Utc>) -> Result<()> {
        self.ensure_available()?;

        let header = EntryHeader {
            key: key.to_string(),
            stored_at: truncate_to_millis(stored_at),
            size: payload.len() as u64,
        };
        let encoded = encode(&header, &payload)?;

        let tmp = self.tmp_path_for(key);
        if let Err(e) = fs::write(&tmp, &encoded).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, self.path_for(key)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(key, size = header.size, "Stored blob");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.ensure_available()?;
        remove_if_exists(&self.path_for(key)).await
    }

    async fn clear(&self) -> Result<()> {
        self.ensure_available()?;

        let mut dir = fs::read_dir(&self.dir).await?;
        let mut removed = 0usize;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if is_entry_file(&path) || is_tmp_file(&path) {
                remove_if_exists(&path).await?;
                removed += 1;
            }
        }

        info!(dir = ?self.dir, removed, "Blob store cleared");
        Ok(())
    }

    fn entries(&self) -> BoxStream<'_, Result<CacheEntry>> {
        enum State {
            Start,
            Reading(fs::ReadDir),
            Done,
        }

        stream::unfold(State::Start, move |state| async move {
            let mut dir = match state {
                State::Start => {
                    if let Err(e) = self.ensure_available() {
                        return Some((Err(e), State::Done));
                    }
                    match fs::read_dir(&self.dir).await {
                        Ok(dir) => dir,
                        Err(e) => return Some((Err(e.into()), State::Done)),
                    }
                }
                State::Reading(dir) => dir,
                State::Done => return None,
            };

            loop {
                let item = match dir.next_entry().await {
                    Ok(Some(item)) => item,
                    Ok(None) => return None,
                    Err(e) => return Some((Err(e.into()), State::Done)),
                };

                let path = item.path();
                if !is_entry_file(&path) {
                    continue;
                }

                match read_entry(&path).await {
                    Ok(entry) => return Some((Ok(entry), State::Reading(dir))),
                    // Deleted between listing and reading
                    Err(e) if is_not_found(&e) => continue,
                    Err(e) => {
                        warn!(path = ?path, error = %e, "Skipping unreadable stored blob");
                        continue;
                    }
                }
            }
        })
        .boxed()
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.ensure_available()?;

        let mut stats = StoreStats::default();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if !is_entry_file(&path) {
                continue;
            }
            match read_header(&path).await {
                Ok(header) => {
                    stats.count += 1;
                    stats.total_bytes += header.size;
                }
                Err(e) if is_not_found(&e) => {}
                Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable stored blob"),
            }
        }

        Ok(stats)
    }
}
