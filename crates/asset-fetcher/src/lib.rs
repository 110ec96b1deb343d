//! Authenticated asset downloads
//!
//! Implements [`asset_cache::FetchBytes`] on top of the app's REST API:
//! avatars come from the auth service, post pictures from the review service.
//! Both are `POST` requests carrying the asset URL as a query parameter and
//! the session token in the `satoken` header.

pub mod error;
pub mod fetcher;
pub mod types;

pub use error::{FetchError, Result};
pub use fetcher::HttpAssetFetcher;
pub use types::{endpoint_path, FetcherConfig, DEFAULT_TIMEOUT_SECS, TOKEN_HEADER};
