//! Fetch coordinator: resolves asset keys to local handles
//!
//! Lookup order is index, then in-flight load, then persistent store, then
//! upstream. The check for an in-flight load and the mark that starts one
//! happen under a single lock acquisition with no await in between, so two
//! concurrent resolves of the same key can never both start a fetch. The load
//! itself runs on its own task and broadcasts its outcome through a watch
//! channel; a caller that stops waiting does not cancel it.

use asset_store::{BlobStore, StoreError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::{AssetKind, CacheConfig};
use crate::fallback::{FallbackDescriptor, DEFAULT_SEED};
use crate::fetch::FetchBytes;
use crate::handles::{HandleRegistry, LocalHandle};
use crate::index::{AssetIndex, FetchState, LoadOutcome, Pending};
use crate::types::{EntryState, Resolved};

#[derive(Default)]
pub(crate) struct Counters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub failures: AtomicU64,
}

pub(crate) struct Inner {
    pub config: CacheConfig,
    pub store: Arc<dyn BlobStore>,
    fetcher: Arc<dyn FetchBytes>,
    pub handles: Arc<HandleRegistry>,
    index: Mutex<AssetIndex>,
    pub counters: Counters,
    pub swept_on_start: AtomicBool,
    /// Bumped by every full clear, under the index lock
    pub epoch: AtomicU64,
}

impl Inner {
    pub fn index(&self) -> MutexGuard<'_, AssetIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load `key` from the store or upstream and publish the handle.
    ///
    /// `epoch` is the clear epoch seen when the load was started; a load
    /// that finishes after a full clear discards its result.
    async fn load(&self, key: &str, force: bool, epoch: u64) -> LoadOutcome {
        let kind = self.config.kind;

        if !force {
            if let Some(entry) = self.store.get(key).await {
                if !self.config.is_expired(entry.stored_at, Utc::now()) {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(%kind, key, size = entry.payload.len(), "Loaded asset from store");
                    return self.install(key, entry.payload, entry.stored_at, epoch).await;
                }

                debug!(%kind, key, stored_at = %entry.stored_at, "Stored asset expired");
                if let Err(e) = self.store.delete(key).await {
                    debug!(%kind, key, error = %e, "Failed to drop expired asset");
                }
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        match self.fetcher.fetch_bytes(key).await {
            Ok(payload) => {
                let stored_at = Utc::now();
                if self.epoch.load(Ordering::Acquire) != epoch {
                    return self.abandon_after_clear(key, false).await;
                }
                match self.store.put_at(key, payload.clone(), stored_at).await {
                    Ok(()) => {}
                    // Already reported by the store when it was opened
                    Err(StoreError::Unavailable(_)) => {}
                    Err(e) => {
                        warn!(%kind, key, error = %e, "Failed to persist asset, serving it uncached")
                    }
                }
                debug!(%kind, key, size = payload.len(), "Fetched asset");
                self.install(key, payload, stored_at, epoch).await
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(%kind, key, error = %e, "Failed to fetch asset");
                self.index().set_failed(key);
                LoadOutcome::Failed
            }
        }
    }

    async fn install(
        &self,
        key: &str,
        payload: Bytes,
        stored_at: DateTime<Utc>,
        epoch: u64,
    ) -> LoadOutcome {
        let installed = {
            let mut index = self.index();
            if self.epoch.load(Ordering::Acquire) == epoch {
                let handle = self.handles.mint(payload);
                index.set_ready(key, handle, stored_at);
                Some(handle)
            } else {
                None
            }
        };

        match installed {
            Some(handle) => LoadOutcome::Ready(handle),
            None => self.abandon_after_clear(key, true).await,
        }
    }

    /// A full clear ran while `key` was loading: drop the in-flight entry
    /// and, if this load already wrote it, the stored copy.
    async fn abandon_after_clear(&self, key: &str, persisted: bool) -> LoadOutcome {
        debug!(kind = %self.config.kind, key, "Cache cleared during load, discarding result");
        self.index().discard(key);
        if persisted {
            if let Err(e) = self.store.delete(key).await {
                debug!(kind = %self.config.kind, key, error = %e, "Failed to drop asset written during clear");
            }
        }
        LoadOutcome::Failed
    }
}

enum Begin {
    /// A fresh handle is already in the index
    Hit(LocalHandle),
    /// Another caller is loading this key
    Attach(Pending),
    /// This caller must start the load, tagged with the current clear epoch
    Lead(watch::Sender<Option<LoadOutcome>>, Pending, u64),
}

/// Publishes the outcome of a load exactly once.
///
/// If the load task is dropped before finishing (panic, runtime shutdown),
/// the key is marked failed and waiters are released with a fallback.
struct Completion {
    inner: Arc<Inner>,
    key: String,
    tx: Option<watch::Sender<Option<LoadOutcome>>>,
}

impl Completion {
    fn publish(mut self, outcome: LoadOutcome) {
        if let Some(tx) = self.tx.take() {
            // Waiters may all have gone away
            let _ = tx.send(Some(outcome));
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            warn!(kind = %self.inner.config.kind, key = %self.key, "Asset load abandoned");
            self.inner.index().set_failed(&self.key);
            let _ = tx.send(Some(LoadOutcome::Failed));
        }
    }
}

async fn wait(mut pending: Pending) -> LoadOutcome {
    match pending.wait_for(Option::is_some).await {
        Ok(outcome) => (*outcome).unwrap_or(LoadOutcome::Failed),
        Err(_) => LoadOutcome::Failed,
    }
}

/// Resolves asset keys of one [`AssetKind`] to local handles.
///
/// Cloning is cheap and every clone shares the same index and store. Build
/// one per kind at startup and hand clones to consumers.
#[derive(Clone)]
pub struct AssetCache {
    pub(crate) inner: Arc<Inner>,
}

impl AssetCache {
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn BlobStore>,
        fetcher: Arc<dyn FetchBytes>,
        handles: Arc<HandleRegistry>,
    ) -> Self {
        let index = AssetIndex::new(Arc::clone(&handles));
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                fetcher,
                handles,
                index: Mutex::new(index),
                counters: Counters::default(),
                swept_on_start: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn kind(&self) -> AssetKind {
        self.inner.config.kind
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn handles(&self) -> &Arc<HandleRegistry> {
        &self.inner.handles
    }

    /// Placeholder for this cache's kind
    pub fn fallback(&self, seed: &str) -> FallbackDescriptor {
        FallbackDescriptor::for_kind(self.kind(), seed)
    }

    /// Resolve `key` to a handle, or to a fallback seeded by the key.
    ///
    /// Never fails: an empty key, an unreachable upstream or a rejected
    /// download all produce the fallback.
    pub async fn resolve(&self, key: &str) -> Resolved {
        let seed = if key.is_empty() { DEFAULT_SEED } else { key };
        self.resolve_inner(key, seed, false).await
    }

    /// Like [`resolve`](Self::resolve) with an explicit fallback seed
    pub async fn resolve_with_seed(&self, key: &str, seed: &str) -> Resolved {
        self.resolve_inner(key, seed, false).await
    }

    /// Fetch `key` upstream again, bypassing the index and the store.
    ///
    /// The current handle stays readable until the new one is installed,
    /// then it is revoked. Joins a load that is already in flight.
    pub async fn refresh(&self, key: &str) -> Resolved {
        let seed = if key.is_empty() { DEFAULT_SEED } else { key };
        self.resolve_inner(key, seed, true).await
    }

    /// Resolve many keys concurrently, skipping empty and duplicate keys.
    ///
    /// Returns how many keys produced a real handle.
    pub async fn prefetch<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let unique: Vec<String> = keys
            .into_iter()
            .map(|key| key.as_ref().to_string())
            .filter(|key| !key.is_empty() && seen.insert(key.clone()))
            .collect();

        let results = join_all(unique.iter().map(|key| self.resolve(key))).await;
        let ready = results.iter().filter(|r| r.is_handle()).count();
        debug!(kind = %self.kind(), requested = unique.len(), ready, "Prefetched assets");
        ready
    }

    /// Current handle for `key` without triggering a load
    pub fn peek(&self, key: &str) -> Option<LocalHandle> {
        self.inner.index().lookup(key).and_then(|entry| entry.handle)
    }

    pub fn state(&self, key: &str) -> EntryState {
        self.inner
            .index()
            .lookup(key)
            .map(|entry| entry.entry_state())
            .unwrap_or(EntryState::Idle)
    }

    /// Payload behind a handle, `None` once revoked
    pub fn read(&self, handle: LocalHandle) -> Option<Bytes> {
        self.inner.handles.read(handle)
    }

    async fn resolve_inner(&self, key: &str, seed: &str, force: bool) -> Resolved {
        if key.is_empty() {
            return Resolved::Fallback(self.fallback(seed));
        }

        let pending = match self.begin(key, force) {
            Begin::Hit(handle) => return Resolved::Handle(handle),
            Begin::Attach(pending) => {
                debug!(kind = %self.kind(), key, "Joined in-flight load");
                pending
            }
            Begin::Lead(tx, pending, epoch) => {
                self.spawn_load(key, force, epoch, tx);
                pending
            }
        };

        match wait(pending).await {
            LoadOutcome::Ready(handle) => Resolved::Handle(handle),
            LoadOutcome::Failed => Resolved::Fallback(self.fallback(seed)),
        }
    }

    /// Check-then-set under one lock acquisition
    fn begin(&self, key: &str, force: bool) -> Begin {
        let mut index = self.inner.index();

        if let Some(entry) = index.lookup(key) {
            match (&entry.state, entry.handle, entry.stored_at) {
                (FetchState::InFlight(pending), _, _) => return Begin::Attach(pending.clone()),
                (FetchState::Ready, Some(handle), Some(stored_at)) if !force => {
                    if !self.inner.config.is_expired(stored_at, Utc::now()) {
                        self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                        return Begin::Hit(handle);
                    }
                    debug!(kind = %self.kind(), key, "Cached handle expired, reloading");
                }
                _ => {}
            }
        }

        let (tx, rx) = watch::channel(None);
        index.set_in_flight(key, rx.clone());
        Begin::Lead(tx, rx, self.inner.epoch.load(Ordering::Acquire))
    }

    fn spawn_load(
        &self,
        key: &str,
        force: bool,
        epoch: u64,
        tx: watch::Sender<Option<LoadOutcome>>,
    ) {
        let completion = Completion {
            inner: Arc::clone(&self.inner),
            key: key.to_string(),
            tx: Some(tx),
        };

        tokio::spawn(async move {
            let outcome = completion.inner.load(&completion.key, force, epoch).await;
            completion.publish(outcome);
        });
    }
}
