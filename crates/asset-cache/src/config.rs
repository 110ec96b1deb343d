//! Asset kinds and per-cache configuration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CacheError;

/// Entries older than this are stale (7 days)
pub const DEFAULT_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// The kinds of remote asset the app displays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetKind {
    Avatar,
    PostImage,
}

impl AssetKind {
    pub const ALL: [AssetKind; 2] = [AssetKind::Avatar, AssetKind::PostImage];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Avatar => "avatar",
            AssetKind::PostImage => "post-image",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avatar" => Ok(AssetKind::Avatar),
            "post-image" => Ok(AssetKind::PostImage),
            other => Err(CacheError::UnknownKind(other.to_string())),
        }
    }
}

/// Configuration for one [`AssetCache`](crate::AssetCache)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub kind: AssetKind,
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn new(kind: AssetKind) -> Self {
        Self {
            kind,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }

    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// True when `now - stored_at` exceeds the TTL
    pub fn is_expired(&self, stored_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let ttl_ms = i64::try_from(self.ttl_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        (now - stored_at).num_milliseconds() > ttl_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::new(AssetKind::Avatar);
        assert_eq!(config.kind, AssetKind::Avatar);
        assert_eq!(config.ttl_secs, 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_is_expired_boundaries() {
        let config = CacheConfig::new(AssetKind::PostImage).with_ttl_secs(60);
        let now = Utc::now();

        assert!(!config.is_expired(now, now));
        assert!(!config.is_expired(now - Duration::seconds(60), now));
        assert!(config.is_expired(now - Duration::milliseconds(60_001), now));
        // Timestamps from the future are not expired
        assert!(!config.is_expired(now + Duration::hours(1), now));
    }

    #[test]
    fn test_default_ttl_is_seven_days() {
        let config = CacheConfig::new(AssetKind::Avatar);
        let now = Utc::now();
        assert!(!config.is_expired(now - Duration::days(6), now));
        assert!(config.is_expired(now - Duration::days(8), now));
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let config = CacheConfig::new(AssetKind::Avatar).with_ttl_secs(u64::MAX);
        let now = Utc::now();
        assert!(!config.is_expired(now - Duration::days(10_000), now));
    }

    #[test]
    fn test_kind_parse_and_display() {
        for kind in AssetKind::ALL {
            assert_eq!(kind.as_str().parse::<AssetKind>().unwrap(), kind);
        }
        assert_eq!(AssetKind::PostImage.to_string(), "post-image");
        assert!("banner".parse::<AssetKind>().is_err());
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&AssetKind::PostImage).unwrap();
        assert_eq!(json, "\"post-image\"");
    }
}
