//! Where a download lands on disk.
//!
//! `{music_dir}[/{album}]/{title}.{ext}`, with ` (n)` appended (starting at 2)
//! while the name is taken on disk or reserved by another in-flight task.

use crate::error::{DownloadError, Result};
use bridge_traits::media::Track;
use bridge_traits::storage::FileSystemAccess;
use core_runtime::settings::DownloadSettings;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Directory name used when a track has no album
pub const UNKNOWN_ALBUM_DIR: &str = "Unknown Album";

const RESERVED_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Replace characters that are invalid in file names with `_` and trim.
///
/// Returns `fallback` when nothing is left.
pub fn sanitize_file_name(name: &str, fallback: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if RESERVED_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Target paths claimed by transfers that have not finished yet.
#[derive(Debug, Default)]
pub struct PathReservations {
    paths: Mutex<HashSet<PathBuf>>,
}

impl PathReservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path`; `false` if it is already claimed
    pub fn reserve(&self, path: &Path) -> bool {
        self.paths.lock().insert(path.to_path_buf())
    }

    pub fn release(&self, path: &Path) {
        self.paths.lock().remove(path);
    }

    pub fn is_reserved(&self, path: &Path) -> bool {
        self.paths.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.lock().is_empty()
    }
}

/// Pick and reserve a free target path for `track`, creating its directory.
///
/// The caller owns the reservation and must release it once the task ends.
pub async fn resolve_target_path(
    track: &Track,
    settings: &DownloadSettings,
    file_system: &dyn FileSystemAccess,
    reservations: &PathReservations,
    extension: &str,
) -> Result<PathBuf> {
    let music_dir = settings
        .music_dir()
        .ok_or(DownloadError::MissingMusicDirectory)?;

    let target_dir = if settings.organize_by_album {
        music_dir.join(sanitize_file_name(&track.album, UNKNOWN_ALBUM_DIR))
    } else {
        music_dir
    };
    file_system.create_dir_all(&target_dir).await?;

    let base_name = sanitize_file_name(&track.title, &track.id);
    let mut index = 1u32;
    loop {
        let candidate = if index == 1 {
            target_dir.join(format!("{}.{}", base_name, extension))
        } else {
            target_dir.join(format!("{} ({}).{}", base_name, index, extension))
        };

        let taken_on_disk =
            !settings.overwrite_existing && file_system.exists(&candidate).await.unwrap_or(false);
        if !taken_on_disk && reservations.reserve(&candidate) {
            return Ok(candidate);
        }
        index += 1;
    }
}
