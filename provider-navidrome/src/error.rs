//! Error types for the Navidrome provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NavidromeError {
    /// No server address configured
    #[error("Navidrome base URL is missing")]
    MissingBaseUrl,

    /// Neither a usable bearer token nor Subsonic credentials
    #[error("Missing Subsonic token or username/password")]
    MissingCredentials,

    /// The base URL could not be parsed
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// Non-2xx HTTP status
    #[error("Navidrome API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// `subsonic-response.status` was not `ok`
    #[error("Subsonic request failed: {0}")]
    SubsonicFailure(String),

    /// Response body did not match the expected shape
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Every listing method failed; messages joined in attempt order
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Track not found on server: {track_id}")]
    TrackNotFound { track_id: String },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, NavidromeError>;

impl From<NavidromeError> for BridgeError {
    fn from(error: NavidromeError) -> Self {
        match error {
            NavidromeError::Bridge(e) => e,
            NavidromeError::MissingBaseUrl | NavidromeError::MissingCredentials => {
                BridgeError::NotAvailable(error.to_string())
            }
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}
