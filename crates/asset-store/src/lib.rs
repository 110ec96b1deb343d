//! Durable key/blob store for cached assets
//!
//! Every entry carries the raw payload bytes and the time it was stored, so
//! callers can apply their own expiry policy. Two backends implement the
//! [`BlobStore`] contract: [`FileBlobStore`] persists entries on disk and
//! survives restarts, [`MemoryBlobStore`] keeps them for the life of the
//! process.

mod error;
mod file;
mod memory;
mod store;
mod types;

pub use error::{Result, StoreError};
pub use file::FileBlobStore;
pub use memory::MemoryBlobStore;
pub use store::BlobStore;
pub use types::{CacheEntry, EntryHeader, StoreStats};
