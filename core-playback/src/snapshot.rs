//! Persisted "what to resume" state and player preferences.
//!
//! A snapshot records the track, mode and volume only. Position is left out
//! on purpose so a restore never seeks into the middle of a track.

use crate::sequencing::PlayMode;
use bridge_traits::error::Result;
use bridge_traits::storage::{SettingsStore, SettingsStoreExt};
use core_runtime::settings::{PLAYER_MODE_KEY, PLAYER_SNAPSHOT_KEY, PLAYER_VOLUME_KEY};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Default volume when nothing is stored
pub const DEFAULT_VOLUME: f64 = 1.0;

/// What a restart would resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub track_id: String,
    pub mode: PlayMode,
    pub volume: f64,
    /// Unix epoch milliseconds
    pub updated_at: i64,
}

/// Stored form, tolerant of unknown modes and a missing volume
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSnapshot {
    track_id: String,
    #[serde(default)]
    mode: String,
    volume: Option<f64>,
    #[serde(default)]
    updated_at: i64,
}

/// Volume and mode restored at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPreferences {
    pub volume: f64,
    pub mode: PlayMode,
}

impl Default for PlayerPreferences {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            mode: PlayMode::List,
        }
    }
}

/// Clamp into `[0, 1]`; NaN becomes 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Reads and writes player state in the settings store.
#[derive(Clone)]
pub struct SnapshotStore {
    settings: Arc<dyn SettingsStore>,
}

impl SnapshotStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    /// Stored snapshot with the mode validated and volume clamped.
    ///
    /// `fallback_volume` fills a snapshot written without one.
    pub async fn load(&self, fallback_volume: f64) -> Result<Option<PlaybackSnapshot>> {
        let stored = self
            .settings
            .read_json::<StoredSnapshot>(PLAYER_SNAPSHOT_KEY)
            .await?;

        Ok(stored.map(|s| {
            let mode = s.mode.parse().unwrap_or_else(|_| {
                warn!(mode = %s.mode, "Unknown play mode in snapshot, using list");
                PlayMode::List
            });
            PlaybackSnapshot {
                track_id: s.track_id,
                mode,
                volume: clamp_unit(s.volume.unwrap_or(fallback_volume)),
                updated_at: s.updated_at,
            }
        }))
    }

    /// Write `snapshot`, or `null` to clear it
    pub async fn save(&self, snapshot: Option<&PlaybackSnapshot>) -> Result<()> {
        self.settings.write_json(PLAYER_SNAPSHOT_KEY, &snapshot).await
    }

    /// Volume and mode, defaulting whatever is missing or unreadable
    pub async fn load_preferences(&self) -> PlayerPreferences {
        let mut prefs = PlayerPreferences::default();

        match self.settings.read_json::<f64>(PLAYER_VOLUME_KEY).await {
            Ok(Some(volume)) => prefs.volume = clamp_unit(volume),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ignoring unreadable volume preference"),
        }

        match self.settings.read_json::<String>(PLAYER_MODE_KEY).await {
            Ok(Some(raw)) => match raw.parse() {
                Ok(mode) => prefs.mode = mode,
                Err(_) => warn!(mode = %raw, "Unknown play mode preference, using list"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ignoring unreadable mode preference"),
        }

        prefs
    }

    pub async fn save_volume(&self, volume: f64) -> Result<()> {
        self.settings
            .write_json(PLAYER_VOLUME_KEY, &clamp_unit(volume))
            .await
    }

    pub async fn save_mode(&self, mode: PlayMode) -> Result<()> {
        self.settings.write_json(PLAYER_MODE_KEY, &mode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::SqliteSettingsStore;

    async fn store() -> SnapshotStore {
        SnapshotStore::new(Arc::new(SqliteSettingsStore::in_memory().await.unwrap()))
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_and_clear() {
        let store = store().await;
        let snapshot = PlaybackSnapshot {
            track_id: "t-42".into(),
            mode: PlayMode::Shuffle,
            volume: 0.35,
            updated_at: 1_700_000_000_000,
        };

        store.save(Some(&snapshot)).await.unwrap();
        assert_eq!(store.load(1.0).await.unwrap(), Some(snapshot));

        store.save(None).await.unwrap();
        assert_eq!(store.load(1.0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_sanitises_stored_values() {
        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        settings
            .set_string(
                PLAYER_SNAPSHOT_KEY,
                r#"{"trackId":"t1","mode":"repeat-one","updatedAt":5}"#,
            )
            .await
            .unwrap();
        let store = SnapshotStore::new(settings.clone());

        let snapshot = store.load(0.6).await.unwrap().unwrap();
        assert_eq!(snapshot.mode, PlayMode::List);
        assert_eq!(snapshot.volume, 0.6);

        settings
            .set_string(PLAYER_SNAPSHOT_KEY, r#"{"trackId":"t1","mode":"order","volume":3.0}"#)
            .await
            .unwrap();
        assert_eq!(store.load(0.6).await.unwrap().unwrap().volume, 1.0);
    }

    #[tokio::test]
    async fn test_preferences_default_and_persist() {
        let store = store().await;
        assert_eq!(store.load_preferences().await, PlayerPreferences::default());

        store.save_volume(1.7).await.unwrap();
        store.save_mode(PlayMode::Single).await.unwrap();

        let prefs = store.load_preferences().await;
        assert_eq!(prefs.volume, 1.0);
        assert_eq!(prefs.mode, PlayMode::Single);
    }

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(-1.0), 0.0);
        assert_eq!(clamp_unit(1.5), 1.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(0.25), 0.25);
    }
}
