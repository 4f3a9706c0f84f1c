//! "Is this song already downloaded?" checks.
//!
//! A record alone is not enough: the file must also still exist, since users
//! delete and move files behind the catalog's back.

use crate::error::Result;
use bridge_traits::media::Track;
use bridge_traits::storage::FileSystemAccess;
use core_library::models::DownloadStatus;
use core_library::repositories::DownloadRepository;
use std::collections::HashSet;
use std::path::Path;

/// `true` when `song_id` has a `success` record whose file exists
pub async fn check_download_status(
    repository: &dyn DownloadRepository,
    file_system: &dyn FileSystemAccess,
    song_id: &str,
) -> Result<bool> {
    let Some(record) = repository.find_by_id(song_id).await? else {
        return Ok(false);
    };
    if record.status != DownloadStatus::Success {
        return Ok(false);
    }
    match record.file_path {
        Some(path) => Ok(file_system.exists(Path::new(&path)).await.unwrap_or(false)),
        None => Ok(false),
    }
}

/// The subset of `tracks` that still needs downloading, order preserved
pub async fn filter_undownloaded(
    repository: &dyn DownloadRepository,
    file_system: &dyn FileSystemAccess,
    tracks: Vec<Track>,
) -> Result<Vec<Track>> {
    let mut downloaded = HashSet::new();
    for record in repository.list(Some(DownloadStatus::Success)).await? {
        let present = match &record.file_path {
            Some(path) => file_system.exists(Path::new(path)).await.unwrap_or(false),
            None => false,
        };
        if present {
            downloaded.insert(record.song_id);
        }
    }

    Ok(tracks
        .into_iter()
        .filter(|track| !downloaded.contains(&track.id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::TokioFileSystem;
    use core_library::db::create_test_pool;
    use core_library::models::DownloadRecord;
    use core_library::repositories::SqliteDownloadRepository;

    async fn record(repo: &SqliteDownloadRepository, id: &str, status: DownloadStatus, path: Option<&Path>) {
        let mut record = DownloadRecord::pending(&Track::new(id, id, "A", "B"));
        record.status = status;
        if status == DownloadStatus::Success {
            record.progress = 100;
        }
        record.file_path = path.map(|p| p.to_string_lossy().into_owned());
        repo.upsert(&record).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.mp3");
        std::fs::write(&present, b"x").unwrap();

        let repo = SqliteDownloadRepository::new(create_test_pool().await.unwrap());
        let fs = TokioFileSystem::new();
        record(&repo, "ok", DownloadStatus::Success, Some(&present)).await;
        record(&repo, "moved", DownloadStatus::Success, Some(&dir.path().join("gone.mp3"))).await;
        record(&repo, "failed", DownloadStatus::Failed, Some(&present)).await;

        assert!(check_download_status(&repo, &fs, "ok").await.unwrap());
        assert!(!check_download_status(&repo, &fs, "moved").await.unwrap());
        assert!(!check_download_status(&repo, &fs, "failed").await.unwrap());
        assert!(!check_download_status(&repo, &fs, "unknown").await.unwrap());
    }

    #[tokio::test]
    async fn test_filter_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("b.mp3");
        std::fs::write(&present, b"x").unwrap();

        let repo = SqliteDownloadRepository::new(create_test_pool().await.unwrap());
        record(&repo, "b", DownloadStatus::Success, Some(&present)).await;
        record(&repo, "c", DownloadStatus::Success, Some(&dir.path().join("c.mp3"))).await;

        let tracks = ["a", "b", "c", "d"]
            .iter()
            .map(|id| Track::new(*id, *id, "A", "B"))
            .collect();
        let remaining = filter_undownloaded(&repo, &TokioFileSystem::new(), tracks)
            .await
            .unwrap();

        let ids: Vec<_> = remaining.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "d"]);
    }
}
