//! Error types for asset downloads

use std::fmt;

#[derive(Debug)]
pub enum FetchError {
    Http(Box<reqwest::Error>),
    /// 401: the session token is missing or expired
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// Any other non-success status
    Status(u16),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Http(err) => write!(f, "HTTP error: {}", err),
            FetchError::Unauthorized => write!(f, "Unauthorized, please log in again"),
            FetchError::Forbidden => write!(f, "Insufficient permissions"),
            FetchError::NotFound => write!(f, "Asset not found"),
            FetchError::Status(code) => write!(f, "Server returned status {}", code),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = FetchError::Status(502);
        assert_eq!(format!("{}", err), "Server returned status 502");
    }

    #[test]
    fn test_error_is_debug() {
        let err = FetchError::NotFound;
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("NotFound"));
    }
}
