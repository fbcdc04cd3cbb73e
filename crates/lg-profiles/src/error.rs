//! Error types shared across the profile layer

use std::time::Duration;

use thiserror::Error;

use crate::fetch::FetchError;
use crate::integrity::IntegrityError;
use crate::store::StoreError;

/// Why a profile failed to load or update.
///
/// Stored in the profile state for display, so it is cloneable and carries
/// messages rather than source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    /// Unreachable source, non-success status, timeout
    #[error("Download failed: {0}")]
    Network(String),

    /// Not a filter list, or no usable rules
    #[error("Invalid filter list: {0}")]
    Format(String),

    /// Declared checksum mismatch or corrupt cache
    #[error("Checksum verification failed: {0}")]
    Integrity(String),

    /// Local list file could not be read
    #[error("Failed to read profile file: {0}")]
    Read(String),
}

impl From<FetchError> for ProfileError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Io(e) => ProfileError::Read(e.to_string()),
            other => ProfileError::Network(other.to_string()),
        }
    }
}

impl From<IntegrityError> for ProfileError {
    fn from(e: IntegrityError) -> Self {
        ProfileError::Integrity(e.to_string())
    }
}

/// Invalid input at the add/edit boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("A profile named {0:?} already exists")]
    DuplicateName(String),

    #[error("Invalid profile name {0:?}: use letters, digits, '-' and '_'")]
    InvalidName(String),

    #[error("Invalid update interval {0:?}: use 0 (never) or between 1 hour and 365 days")]
    InvalidInterval(Duration),

    #[error("Invalid source URL {0:?}: expected http://, https:// or file://")]
    InvalidUrl(String),

    #[error("No profile named {0:?}")]
    UnknownProfile(String),
}

/// Errors from [`ContentBlockingManager`](crate::ContentBlockingManager) operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Fetcher setup failed: {0}")]
    Fetch(#[from] FetchError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_mapping() {
        let err: ProfileError = FetchError::Http(503).into();
        assert_eq!(err, ProfileError::Network("HTTP error: 503".into()));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ProfileError = FetchError::Io(io).into();
        assert!(matches!(err, ProfileError::Read(_)));
    }

    #[test]
    fn test_display() {
        let err = ConfigurationError::InvalidInterval(Duration::from_secs(60));
        assert!(err.to_string().contains("1 hour"));
        assert_eq!(ProfileError::Format("empty".into()).to_string(), "Invalid filter list: empty");
    }
}
