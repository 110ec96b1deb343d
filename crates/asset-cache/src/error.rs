//! Error types for the asset cache

use asset_store::StoreError;
use std::fmt;

/// Errors surfaced by maintenance operations.
///
/// Resolution never fails; it degrades to a fallback instead.
#[derive(Debug)]
pub enum CacheError {
    Store(StoreError),
    UnknownKind(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Store(err) => write!(f, "Store error: {}", err),
            CacheError::UnknownKind(kind) => write!(f, "Unknown asset kind: {}", kind),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        CacheError::Store(err)
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = CacheError::from(StoreError::Unavailable("/tmp/assets".to_string()));
        assert_eq!(
            format!("{}", err),
            "Store error: Storage unavailable: /tmp/assets"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_unknown_kind_display() {
        let err = CacheError::UnknownKind("banner".to_string());
        assert_eq!(format!("{}", err), "Unknown asset kind: banner");
    }
}
