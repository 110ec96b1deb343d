//! Revocable local handles backed by in-memory payloads
//!
//! A [`LocalHandle`] is what rendering code uses in place of a remote URL.
//! The [`HandleRegistry`] owns the payload behind every live handle. A handle
//! is revoked exactly once; after that [`HandleRegistry::read`] returns `None`
//! and the payload is released.

use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{trace, warn};

const HANDLE_SCHEME: &str = "blob:asset-cache";

/// Opaque reference to a payload held by a [`HandleRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalHandle(u64);

impl LocalHandle {
    pub fn id(&self) -> u64 {
        self.0
    }

    /// Rebuild a handle from an id received from a renderer.
    ///
    /// The result is only meaningful if the registry still has it live.
    pub fn from_id(id: u64) -> Self {
        LocalHandle(id)
    }
}

impl fmt::Display for LocalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", HANDLE_SCHEME, self.0)
    }
}

/// Lifetime counters for handles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HandleStats {
    pub minted: u64,
    pub revoked: u64,
    pub live: usize,
}

/// Mints and revokes [`LocalHandle`]s
pub struct HandleRegistry {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, Bytes>>,
    minted: AtomicU64,
    revoked: AtomicU64,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
            minted: AtomicU64::new(0),
            revoked: AtomicU64::new(0),
        }
    }

    fn live(&self) -> MutexGuard<'_, HashMap<u64, Bytes>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a new handle backed by `payload`
    pub(crate) fn mint(&self, payload: Bytes) -> LocalHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.live().insert(id, payload);
        self.minted.fetch_add(1, Ordering::Relaxed);
        trace!(handle = id, "Minted handle");
        LocalHandle(id)
    }

    /// Release the payload behind `handle`.
    ///
    /// Returns false, without touching the counters, if the handle was
    /// already revoked.
    pub(crate) fn revoke(&self, handle: LocalHandle) -> bool {
        let removed = self.live().remove(&handle.0);
        match removed {
            Some(_) => {
                self.revoked.fetch_add(1, Ordering::Relaxed);
                trace!(handle = handle.0, "Revoked handle");
                true
            }
            None => {
                warn!(handle = handle.0, "Handle revoked twice");
                false
            }
        }
    }

    /// Payload behind a live handle
    pub fn read(&self, handle: LocalHandle) -> Option<Bytes> {
        self.live().get(&handle.0).cloned()
    }

    pub fn is_live(&self, handle: LocalHandle) -> bool {
        self.live().contains_key(&handle.0)
    }

    pub fn stats(&self) -> HandleStats {
        HandleStats {
            minted: self.minted.load(Ordering::Relaxed),
            revoked: self.revoked.load(Ordering::Relaxed),
            live: self.live().len(),
        }
    }

    /// Mint a handle owned by the caller instead of the cache.
    ///
    /// The handle is revoked when the returned guard is dropped.
    pub fn scoped(self: &Arc<Self>, payload: Bytes) -> ScopedHandle {
        ScopedHandle {
            handle: self.mint(payload),
            registry: Arc::clone(self),
        }
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A consumer-owned handle, revoked on drop
pub struct ScopedHandle {
    handle: LocalHandle,
    registry: Arc<HandleRegistry>,
}

impl ScopedHandle {
    pub fn handle(&self) -> LocalHandle {
        self.handle
    }
}

impl Drop for ScopedHandle {
    fn drop(&mut self) {
        self.registry.revoke(self.handle);
    }
}
