use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Missing host capability {capability}: {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),

    #[error("Download error: {0}")]
    Download(#[from] core_download::DownloadError),

    #[error("Media server error: {0}")]
    Provider(#[from] provider_navidrome::NavidromeError),

    #[error(transparent)]
    Bridge(#[from] bridge_traits::BridgeError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
