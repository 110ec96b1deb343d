//! Asset proxy - local cache for avatars and post images
//!
//! Resolves asset keys to revocable local handles backed by a persistent
//! store, downloading from the app's API only on a miss.

mod caches;
mod error;
mod server;
mod types;

use crate::caches::AssetCaches;
use crate::error::Result;
use crate::server::{start_server, ServerState, SharedState};
use crate::types::ProxyConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("asset_proxy=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting asset proxy...");

    let config = load_config();
    info!("Port: {}", config.port);
    match &config.cache_dir {
        Some(dir) => info!("Cache dir: {:?}", dir),
        None => info!("Cache dir: none, assets kept in memory"),
    }
    info!("Cache TTL: {} seconds", config.cache_ttl_secs);
    info!("API base URL: {}", config.api_base_url);
    if config.auth_token.is_none() {
        info!("No AUTH_TOKEN set, downloads are unauthenticated");
    }

    let caches = AssetCaches::from_config(&config).await?;
    caches.sweep_on_start().await;

    let state: SharedState = Arc::new(ServerState::new(caches));

    // Start HTTP server (blocking)
    start_server(state, config.port).await?;

    Ok(())
}

fn load_config() -> ProxyConfig {
    let defaults = ProxyConfig::default();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(defaults.port);

    // An empty CACHE_DIR disables persistence
    let cache_dir = match std::env::var("CACHE_DIR") {
        Ok(dir) if dir.is_empty() => None,
        Ok(dir) => Some(PathBuf::from(dir)),
        Err(_) => defaults.cache_dir,
    };

    let cache_ttl_secs = std::env::var("CACHE_TTL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(defaults.cache_ttl_secs);

    let api_base_url = std::env::var("API_BASE_URL").unwrap_or(defaults.api_base_url);

    let auth_token = std::env::var("AUTH_TOKEN")
        .ok()
        .filter(|token| !token.is_empty());

    let fetch_timeout_secs = std::env::var("FETCH_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(defaults.fetch_timeout_secs);

    ProxyConfig {
        port,
        cache_dir,
        cache_ttl_secs,
        api_base_url,
        auth_token,
        fetch_timeout_secs,
    }
}
