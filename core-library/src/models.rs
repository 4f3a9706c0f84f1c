//! Catalog rows stored in the library database.
//!
//! All three catalogs key by the remote song id (`local_music` uses a fresh
//! UUID for imported files, which never collides with server ids).

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

pub use bridge_traits::media::Track;

// =============================================================================
// Local songs
// =============================================================================

/// A user-imported audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LocalSong {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// File size in bytes
    pub size: i64,
    /// Absolute path on disk
    pub path: String,
    pub created: Option<String>,
}

impl LocalSong {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Local song id cannot be empty".to_string());
        }
        if self.path.trim().is_empty() {
            return Err("Local song path cannot be empty".to_string());
        }
        if self.size < 0 {
            return Err("Local song size cannot be negative".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Downloads
// =============================================================================

/// Lifecycle state of a download record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Success,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Success => "success",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Cancelled => "cancelled",
        }
    }

    /// No transfer will touch the record again without a new start
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Success | DownloadStatus::Failed | DownloadStatus::Cancelled
        )
    }

    /// Queued or transferring
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DownloadStatus::Pending),
            "downloading" => Ok(DownloadStatus::Downloading),
            "success" => Ok(DownloadStatus::Success),
            "failed" => Ok(DownloadStatus::Failed),
            "cancelled" => Ok(DownloadStatus::Cancelled),
            other => Err(format!("Unknown download status: {}", other)),
        }
    }
}

/// Persisted state of one song's download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub song_id: String,
    pub title: String,
    pub album: String,
    /// Expected size in bytes from the catalog, 0 when unknown
    pub size: i64,
    pub status: DownloadStatus,
    /// 0..=100; 100 only once `status` is `success`
    pub progress: u8,
    pub file_path: Option<String>,
    pub error_message: Option<String>,
    pub created: Option<String>,
}

impl DownloadRecord {
    /// A fresh `pending` record for `track`
    pub fn pending(track: &Track) -> Self {
        Self {
            song_id: track.id.clone(),
            title: track.title.clone(),
            album: track.album.clone(),
            size: track.size.map(|s| s as i64).unwrap_or(0),
            status: DownloadStatus::Pending,
            progress: 0,
            file_path: None,
            error_message: None,
            created: track.created.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.song_id.trim().is_empty() {
            return Err("Download song id cannot be empty".to_string());
        }
        if self.progress > 100 {
            return Err(format!("Download progress {} exceeds 100", self.progress));
        }
        if self.status == DownloadStatus::Success && self.file_path.is_none() {
            return Err("Successful download must have a file path".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Recent plays
// =============================================================================

/// Maximum number of rows kept in `recent_plays`
pub const RECENT_PLAYS_LIMIT: i64 = 500;

/// One entry of the recently-played list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RecentPlay {
    pub song_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Seconds
    pub duration: f64,
    pub created: Option<String>,
    pub cover_url: Option<String>,
    /// Unix epoch milliseconds
    pub last_played: i64,
}

impl RecentPlay {
    pub fn from_track(track: &Track, played_at_millis: i64) -> Self {
        Self {
            song_id: track.id.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            duration: track.duration,
            created: track.created.clone(),
            cover_url: track.cover_url.clone(),
            last_played: played_at_millis,
        }
    }

    /// Back to the catalog shape, for replaying from history
    pub fn to_track(&self) -> Track {
        Track {
            id: self.song_id.clone(),
            title: self.title.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            duration: self.duration,
            cover_url: self.cover_url.clone(),
            size: None,
            created: self.created.clone(),
        }
    }
}
