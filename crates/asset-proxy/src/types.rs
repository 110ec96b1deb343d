//! Configuration and response types for the asset proxy

use asset_cache::{
    CacheStats, FallbackDescriptor, HandleStats, LocalHandle, MaintenanceReport, Resolved,
    DEFAULT_TTL_SECS,
};
use asset_fetcher::DEFAULT_TIMEOUT_SECS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the asset proxy
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    /// Root of the on-disk stores; `None` keeps everything in memory
    pub cache_dir: Option<PathBuf>,
    pub cache_ttl_secs: u64,
    pub api_base_url: String,
    pub auth_token: Option<String>,
    pub fetch_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3002,
            cache_dir: Some(PathBuf::from("./cache/assets")),
            cache_ttl_secs: DEFAULT_TTL_SECS,
            api_base_url: "http://localhost:8080".to_string(),
            auth_token: None,
            fetch_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// `?key=..&seed=..`
#[derive(Debug, Default, Deserialize)]
pub struct KeyQuery {
    #[serde(default)]
    pub key: String,
    pub seed: Option<String>,
}

/// Body of `POST /prefetch/{kind}`
#[derive(Debug, Deserialize)]
pub struct PrefetchRequest {
    pub keys: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PrefetchResponse {
    pub requested: usize,
    pub ready: usize,
}

/// Resolution result as seen by the renderer
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolveResponse {
    Ready {
        handle: String,
        id: u64,
        href: String,
    },
    Fallback {
        fallback: FallbackDescriptor,
    },
}

impl From<LocalHandle> for ResolveResponse {
    fn from(handle: LocalHandle) -> Self {
        ResolveResponse::Ready {
            handle: handle.to_string(),
            id: handle.id(),
            href: format!("/handle/{}", handle.id()),
        }
    }
}

impl From<Resolved> for ResolveResponse {
    fn from(resolved: Resolved) -> Self {
        match resolved {
            Resolved::Handle(handle) => handle.into(),
            Resolved::Fallback(fallback) => ResolveResponse::Fallback { fallback },
        }
    }
}

/// Statistics for every asset kind plus the shared handle counters
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub avatar: CacheStats,
    pub post_image: CacheStats,
    pub handles: HandleStats,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    /// Absent when storage cannot be read
    pub stats: Option<StatsResponse>,
}

#[derive(Debug, Serialize)]
pub struct CleanExpiredResponse {
    pub avatar: MaintenanceReport,
    pub post_image: MaintenanceReport,
}

/// Handles revoked per kind by a full clear
#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub avatar: usize,
    pub post_image: usize,
}
