//! Result and report types

use serde::Serialize;

use crate::fallback::FallbackDescriptor;
use crate::handles::LocalHandle;

/// Outcome of resolving an asset key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Handle(LocalHandle),
    Fallback(FallbackDescriptor),
}

impl Resolved {
    pub fn handle(&self) -> Option<LocalHandle> {
        match self {
            Resolved::Handle(handle) => Some(*handle),
            Resolved::Fallback(_) => None,
        }
    }

    pub fn is_handle(&self) -> bool {
        matches!(self, Resolved::Handle(_))
    }
}

/// Observable state of one key in the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Not in the index
    Idle,
    InFlight,
    Ready,
    Failed,
}

/// Statistics about one asset cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries in the persistent store
    pub count: usize,
    /// Sum of stored payload sizes
    pub total_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub failures: u64,
}

/// Result of an expiry sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub scanned: usize,
    pub removed: usize,
    pub revoked_handles: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.total_bytes, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_cache_stats_serialization() {
        let stats = CacheStats {
            count: 3,
            total_bytes: 50_000,
            hits: 10,
            misses: 3,
            failures: 1,
        };

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["count"], 3);
        assert_eq!(json["total_bytes"], 50_000);
        assert_eq!(json["failures"], 1);
    }

    #[test]
    fn test_resolved_accessors() {
        let fallback = Resolved::Fallback(FallbackDescriptor::Empty);
        assert!(!fallback.is_handle());
        assert!(fallback.handle().is_none());
    }

    #[test]
    fn test_entry_state_serialization() {
        let json = serde_json::to_string(&EntryState::InFlight).unwrap();
        assert_eq!(json, "\"in_flight\"");
    }
}
