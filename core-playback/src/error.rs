//! # Playback Error Types

use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Resolution Errors
    // ========================================================================
    /// No playable source could be produced for the track.
    #[error("No playable source for track {track_id}: {reason}")]
    ResolutionExhausted { track_id: String, reason: String },

    /// Track is not part of the queue or unknown to the server.
    #[error("Track not found: {0}")]
    TrackNotFound(String),

    /// The media server rejected or failed a request.
    #[error("Media server error: {0}")]
    Provider(String),

    // ========================================================================
    // Playback Control Errors
    // ========================================================================
    /// Attempted operation when no track is loaded.
    #[error("No track loaded")]
    NoTrackLoaded,

    /// The host audio output refused a command.
    #[error("Audio output error: {0}")]
    Output(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if the current play attempt cannot continue.
    ///
    /// Everything else is absorbed where it happens (cache fills, snapshot
    /// writes, recent-play records).
    pub fn is_fatal_to_attempt(&self) -> bool {
        matches!(
            self,
            PlaybackError::ResolutionExhausted { .. }
                | PlaybackError::Output(_)
                | PlaybackError::NoTrackLoaded
        )
    }

    /// Returns `true` if this error came from persistence.
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::Library(_) | PlaybackError::Bridge(BridgeError::DatabaseError(_))
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
