//! Asset cache for remote images
//!
//! Resolves an asset key (avatar or post picture URL) to a process-local
//! [`LocalHandle`]. Lookups go through an in-memory index, then a persistent
//! [`BlobStore`](asset_store::BlobStore), and only then upstream through a
//! [`FetchBytes`] implementation. Concurrent lookups for the same key share a
//! single upstream fetch. When no asset is available the caller gets a
//! deterministic [`FallbackDescriptor`] instead of an error.

mod cache;
mod config;
mod error;
mod fallback;
mod fetch;
mod handles;
mod index;
mod maintenance;
mod types;

pub use cache::AssetCache;
pub use config::{AssetKind, CacheConfig, DEFAULT_TTL_SECS};
pub use error::{CacheError, Result};
pub use fallback::{generated_avatar_url, FallbackDescriptor, DEFAULT_SEED};
pub use fetch::{BoxError, FetchBytes};
pub use handles::{HandleRegistry, HandleStats, LocalHandle, ScopedHandle};
pub use types::{CacheStats, EntryState, MaintenanceReport, Resolved};
