//! In-memory index from asset key to live handle and fetch state
//!
//! The index owns the handles it references: whenever an entry's handle is
//! replaced or dropped, the index revokes it through the shared
//! [`HandleRegistry`]. Nothing else revokes cache-owned handles.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::handles::{HandleRegistry, LocalHandle};
use crate::types::EntryState;

/// Result broadcast to every waiter of one load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadOutcome {
    Ready(LocalHandle),
    Failed,
}

/// Subscription to a load in progress; `None` until it completes
pub(crate) type Pending = watch::Receiver<Option<LoadOutcome>>;

#[derive(Debug)]
pub(crate) enum FetchState {
    InFlight(Pending),
    Ready,
    Failed,
}

#[derive(Debug)]
pub(crate) struct IndexEntry {
    /// Live handle, if any. Always set when `Ready`; may hold the previous
    /// handle while a reload is in flight.
    pub handle: Option<LocalHandle>,
    pub state: FetchState,
    /// When the payload behind `handle` was stored
    pub stored_at: Option<DateTime<Utc>>,
}

impl IndexEntry {
    pub fn entry_state(&self) -> EntryState {
        match self.state {
            FetchState::InFlight(_) => EntryState::InFlight,
            FetchState::Ready => EntryState::Ready,
            FetchState::Failed => EntryState::Failed,
        }
    }
}

pub(crate) struct AssetIndex {
    entries: HashMap<String, IndexEntry>,
    handles: Arc<HandleRegistry>,
}

impl AssetIndex {
    pub fn new(handles: Arc<HandleRegistry>) -> Self {
        Self {
            entries: HashMap::new(),
            handles,
        }
    }

    pub fn lookup(&self, key: &str) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    /// Mark `key` as loading. Returns false, leaving the existing
    /// subscription in place, if a load is already in flight.
    pub fn set_in_flight(&mut self, key: &str, pending: Pending) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if matches!(entry.state, FetchState::InFlight(_)) => false,
            Some(entry) => {
                entry.state = FetchState::InFlight(pending);
                true
            }
            None => {
                self.entries.insert(
                    key.to_string(),
                    IndexEntry {
                        handle: None,
                        state: FetchState::InFlight(pending),
                        stored_at: None,
                    },
                );
                true
            }
        }
    }

    /// Install `handle` for `key`. A superseded handle is revoked after the
    /// new one is in place.
    pub fn set_ready(&mut self, key: &str, handle: LocalHandle, stored_at: DateTime<Utc>) {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| IndexEntry {
                handle: None,
                state: FetchState::Ready,
                stored_at: None,
            });

        let previous = entry.handle.replace(handle);
        entry.state = FetchState::Ready;
        entry.stored_at = Some(stored_at);

        if let Some(previous) = previous.filter(|previous| *previous != handle) {
            self.handles.revoke(previous);
        }
    }

    /// Mark the last load of `key` as failed. The next resolve retries.
    pub fn set_failed(&mut self, key: &str) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.state = FetchState::Failed;
            entry.stored_at = None;
            if let Some(handle) = entry.handle.take() {
                self.handles.revoke(handle);
            }
        }
    }

    /// Drop the handle for `key`, revoking it. An in-flight load keeps its
    /// entry so it is not started a second time.
    ///
    /// Returns true if a handle was revoked.
    pub fn invalidate(&mut self, key: &str) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };

        let revoked = match entry.handle.take() {
            Some(handle) => self.handles.revoke(handle),
            None => false,
        };
        entry.stored_at = None;

        if !matches!(entry.state, FetchState::InFlight(_)) {
            self.entries.remove(key);
        }
        revoked
    }

    /// Invalidate `key` only if its current payload is stale.
    ///
    /// An in-flight load is left alone, and so is an entry whose
    /// `stored_at` does not satisfy `is_expired`. Returns true if a handle
    /// was revoked.
    pub fn invalidate_expired(
        &mut self,
        key: &str,
        is_expired: impl FnOnce(DateTime<Utc>) -> bool,
    ) -> bool {
        match self.entries.get(key) {
            None => return false,
            Some(entry) if matches!(entry.state, FetchState::InFlight(_)) => return false,
            Some(entry) => {
                if let Some(stored_at) = entry.stored_at {
                    if !is_expired(stored_at) {
                        return false;
                    }
                }
            }
        }
        self.invalidate(key)
    }

    /// Remove the entry for `key` outright, revoking any handle it holds
    pub fn discard(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            if let Some(handle) = entry.handle {
                self.handles.revoke(handle);
            }
        }
    }

    /// Invalidate every entry, returning how many handles were revoked
    pub fn invalidate_all(&mut self) -> usize {
        let handles = &self.handles;
        let mut revoked = 0;
        self.entries.retain(|_, entry| {
            if let Some(handle) = entry.handle.take() {
                if handles.revoke(handle) {
                    revoked += 1;
                }
            }
            entry.stored_at = None;
            matches!(entry.state, FetchState::InFlight(_))
        });
        revoked
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
