#![cfg(feature = "desktop-shims")]

use bridge_traits::Track;
use core_library::db::{create_pool, DatabaseConfig};
use core_library::models::{DownloadRecord, DownloadStatus};
use core_library::repositories::{DownloadRepository, SqliteDownloadRepository};
use core_playback::PlayMode;
use core_runtime::config::CoreConfig;
use core_runtime::settings::DownloadSettings;
use core_service::MusicCore;
use std::path::Path;

fn config(dir: &Path) -> CoreConfig {
    CoreConfig::builder()
        .database_path(dir.join("data").join("library.db"))
        .max_concurrent_downloads(2)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_fresh_bootstrap_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let core = MusicCore::bootstrap(config(dir.path())).await.unwrap();

    let view = core.session().view();
    assert_eq!(view.mode, PlayMode::List);
    assert_eq!(view.volume, 1.0);
    assert_eq!(view.current_index, -1);
    assert!(view.queue.is_empty());
    assert!(core.downloads().tasks().is_empty());
    assert!(dir.path().join("data").join("library.db").exists());
}

#[tokio::test]
async fn test_bootstrap_fails_interrupted_downloads() {
    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("library.db");
    {
        let pool = create_pool(DatabaseConfig::new(&database)).await.unwrap();
        let repository = SqliteDownloadRepository::new(pool.clone());
        let mut record = DownloadRecord::pending(&Track::new("s1", "Song", "Artist", "Album"));
        record.status = DownloadStatus::Downloading;
        record.progress = 41;
        repository.upsert(&record).await.unwrap();
        pool.close().await;
    }

    let core = MusicCore::bootstrap(CoreConfig::builder().database_path(&database).build().unwrap())
        .await
        .unwrap();

    let failed = core
        .downloads()
        .list_records(Some(DownloadStatus::Failed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].progress, 0);
    assert_eq!(
        failed[0].error_message.as_deref(),
        Some(core_download::INTERRUPTED_MESSAGE)
    );
}

#[tokio::test]
async fn test_preferences_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    let core = MusicCore::bootstrap(config(dir.path())).await.unwrap();
    core.session().set_volume(0.4).await;
    core.session().set_mode(PlayMode::Shuffle).await;
    drop(core);

    let core = MusicCore::bootstrap(config(dir.path())).await.unwrap();
    let view = core.session().view();
    assert_eq!(view.volume, 0.4);
    assert_eq!(view.mode, PlayMode::Shuffle);
}

#[tokio::test]
async fn test_download_settings_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let core = MusicCore::bootstrap(config(dir.path())).await.unwrap();
    assert_eq!(core.download_settings().await, DownloadSettings::default());

    let settings = DownloadSettings {
        music_dir: dir.path().join("Music").to_string_lossy().into_owned(),
        organize_by_album: false,
        ..Default::default()
    };
    core.save_download_settings(&settings).await.unwrap();

    assert_eq!(core.download_settings().await, settings);
}
