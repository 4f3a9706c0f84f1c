//! Resolved playback sources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where the playable bytes came from, in resolution priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A user-imported file
    Local,
    /// A completed download
    Downloaded,
    /// The stream cache (pre-existing or just filled)
    Cached,
    /// The remote stream URL, played directly
    Online,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Local => "local",
            SourceKind::Downloaded => "downloaded",
            SourceKind::Cached => "cached",
            SourceKind::Online => "online",
        }
    }

    /// Playable without network access
    pub fn is_offline(&self) -> bool {
        !matches!(self, SourceKind::Online)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the audio output is asked to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceHandle {
    /// A complete file on disk
    File(PathBuf),
    /// A URL the output streams from
    Url(String),
}

/// Result of resolving one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayableSource {
    pub track_id: String,
    pub kind: SourceKind,
    pub handle: SourceHandle,
}

impl PlayableSource {
    pub fn file(track_id: impl Into<String>, kind: SourceKind, path: PathBuf) -> Self {
        Self {
            track_id: track_id.into(),
            kind,
            handle: SourceHandle::File(path),
        }
    }

    pub fn online(track_id: impl Into<String>, url: String) -> Self {
        Self {
            track_id: track_id.into(),
            kind: SourceKind::Online,
            handle: SourceHandle::Url(url),
        }
    }
}
