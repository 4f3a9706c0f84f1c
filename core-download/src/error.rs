//! # Download Error Types

use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloadError {
    /// No music directory is configured in the download settings.
    #[error("Download directory is not configured")]
    MissingMusicDirectory,

    /// The transfer was aborted through its cancellation token.
    #[error("Download cancelled")]
    Cancelled,

    /// The byte stream failed or ended early.
    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("No download task for song {0}")]
    TaskNotFound(String),

    #[error("Media server error: {0}")]
    Provider(String),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("Invalid download configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DownloadError {
    /// Returns `true` when the error only reflects a user cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_predicate() {
        assert!(DownloadError::Cancelled.is_cancellation());
        assert!(!DownloadError::Transfer("reset".into()).is_cancellation());
        assert!(!DownloadError::MissingMusicDirectory.is_cancellation());
    }

    #[test]
    fn test_bridge_error_converts() {
        let err: DownloadError = BridgeError::NotAvailable("offline".into()).into();
        assert!(matches!(err, DownloadError::Bridge(_)));
        assert!(err.to_string().contains("offline"));
    }
}
