//! User settings persisted in the key-value [`SettingsStore`].
//!
//! Values are JSON documents under fixed keys. Services re-read them on every
//! call so a change in the settings screen applies without a restart.

use bridge_traits::storage::{SettingsStore, SettingsStoreExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Player volume, a number in `[0, 1]`
pub const PLAYER_VOLUME_KEY: &str = "player.volume";
/// Play mode name (`list`, `order`, `single`, `shuffle`)
pub const PLAYER_MODE_KEY: &str = "player.mode";
/// Last playback snapshot, or `null`
pub const PLAYER_SNAPSHOT_KEY: &str = "player.snapshot";
/// [`DownloadSettings`] document
pub const DOWNLOAD_SETTINGS_KEY: &str = "settings.download";

/// Where downloads and the stream cache live on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DownloadSettings {
    /// Destination for downloaded songs. Empty disables downloads.
    pub music_dir: String,
    /// Put each download in an album sub-directory
    pub organize_by_album: bool,
    /// Reuse an existing file name instead of appending ` (n)`
    pub overwrite_existing: bool,
    /// Stream cache directory. Empty disables caching.
    pub cache_dir: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            music_dir: String::new(),
            organize_by_album: true,
            overwrite_existing: false,
            cache_dir: String::new(),
        }
    }
}

impl DownloadSettings {
    /// Load from the store, falling back to defaults when absent or malformed.
    pub async fn load(store: &dyn SettingsStore) -> Self {
        match store.read_json::<DownloadSettings>(DOWNLOAD_SETTINGS_KEY).await {
            Ok(Some(settings)) => settings,
            Ok(None) => Self::default(),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable download settings");
                Self::default()
            }
        }
    }

    pub async fn save(&self, store: &dyn SettingsStore) -> bridge_traits::error::Result<()> {
        store.write_json(DOWNLOAD_SETTINGS_KEY, self).await
    }

    /// Trimmed music directory, `None` when unset
    pub fn music_dir(&self) -> Option<PathBuf> {
        non_empty_path(&self.music_dir)
    }

    /// Trimmed cache directory, `None` when unset
    pub fn cache_dir(&self) -> Option<PathBuf> {
        non_empty_path(&self.cache_dir)
    }
}

fn non_empty_path(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}
