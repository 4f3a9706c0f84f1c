//! Download record repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{DownloadRecord, DownloadStatus};
use crate::repositories::delete_where_in;
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

/// Access to the `downloads` table
#[async_trait]
pub trait DownloadRepository: Send + Sync {
    /// Insert or replace the record keyed by `song_id`
    async fn upsert(&self, record: &DownloadRecord) -> Result<()>;

    async fn find_by_id(&self, song_id: &str) -> Result<Option<DownloadRecord>>;

    /// Records ordered by title, optionally restricted to one status
    async fn list(&self, status: Option<DownloadStatus>) -> Result<Vec<DownloadRecord>>;

    /// Delete one record
    ///
    /// # Returns
    /// - `Ok(true)` if a row was removed
    /// - `Ok(false)` if there was none
    async fn delete(&self, song_id: &str) -> Result<bool>;

    async fn delete_many(&self, song_ids: &[String]) -> Result<u64>;
}

/// SQLite implementation of DownloadRepository
pub struct SqliteDownloadRepository {
    pool: SqlitePool,
}

impl SqliteDownloadRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DownloadRepository for SqliteDownloadRepository {
    async fn upsert(&self, record: &DownloadRecord) -> Result<()> {
        record
            .validate()
            .map_err(|msg| LibraryError::invalid("download", msg))?;

        sqlx::query(
            r#"
            REPLACE INTO downloads (
                song_id, title, album, size, status, progress,
                file_path, error_message, created
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.song_id)
        .bind(&record.title)
        .bind(&record.album)
        .bind(record.size)
        .bind(record.status)
        .bind(record.progress)
        .bind(&record.file_path)
        .bind(&record.error_message)
        .bind(&record.created)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, song_id: &str) -> Result<Option<DownloadRecord>> {
        let record = query_as::<_, DownloadRecord>("SELECT * FROM downloads WHERE song_id = ?")
            .bind(song_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn list(&self, status: Option<DownloadStatus>) -> Result<Vec<DownloadRecord>> {
        let records = match status {
            Some(status) => {
                query_as::<_, DownloadRecord>(
                    "SELECT * FROM downloads WHERE status = ? ORDER BY title COLLATE NOCASE",
                )
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                query_as::<_, DownloadRecord>("SELECT * FROM downloads ORDER BY title COLLATE NOCASE")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(records)
    }

    async fn delete(&self, song_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM downloads WHERE song_id = ?")
            .bind(song_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, song_ids: &[String]) -> Result<u64> {
        delete_where_in(&self.pool, "downloads", "song_id", song_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::Track;

    fn record(id: &str, title: &str, status: DownloadStatus) -> DownloadRecord {
        let mut record = DownloadRecord::pending(&Track::new(id, title, "Artist", "Album"));
        record.status = status;
        if status == DownloadStatus::Success {
            record.progress = 100;
            record.file_path = Some(format!("/music/{}.mp3", title));
        }
        record
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let repo = SqliteDownloadRepository::new(create_test_pool().await.unwrap());
        let original = record("s1", "Song", DownloadStatus::Pending);
        repo.upsert(&original).await.unwrap();

        assert_eq!(repo.find_by_id("s1").await.unwrap(), Some(original));
        assert!(repo.find_by_id("s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_and_progress_persist() {
        let repo = SqliteDownloadRepository::new(create_test_pool().await.unwrap());
        let mut rec = record("s1", "Song", DownloadStatus::Pending);
        repo.upsert(&rec).await.unwrap();

        rec.status = DownloadStatus::Downloading;
        rec.progress = 42;
        repo.upsert(&rec).await.unwrap();

        let stored = repo.find_by_id("s1").await.unwrap().unwrap();
        assert_eq!(stored.status, DownloadStatus::Downloading);
        assert_eq!(stored.progress, 42);

        let (raw,): (String,) = sqlx::query_as("SELECT status FROM downloads WHERE song_id = 's1'")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(raw, "downloading");
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let repo = SqliteDownloadRepository::new(create_test_pool().await.unwrap());
        repo.upsert(&record("1", "beta", DownloadStatus::Success)).await.unwrap();
        repo.upsert(&record("2", "Alpha", DownloadStatus::Success)).await.unwrap();
        repo.upsert(&record("3", "gamma", DownloadStatus::Failed)).await.unwrap();

        let all = repo.list(None).await.unwrap();
        assert_eq!(all.len(), 3);

        let done: Vec<String> = repo
            .list(Some(DownloadStatus::Success))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(done, vec!["Alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_delete_and_delete_many() {
        let repo = SqliteDownloadRepository::new(create_test_pool().await.unwrap());
        for id in ["1", "2", "3"] {
            repo.upsert(&record(id, id, DownloadStatus::Failed)).await.unwrap();
        }

        assert!(repo.delete("1").await.unwrap());
        assert!(!repo.delete("1").await.unwrap());
        assert_eq!(
            repo.delete_many(&["2".to_string(), "3".to_string()]).await.unwrap(),
            2
        );
        assert!(repo.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_success_without_path() {
        let repo = SqliteDownloadRepository::new(create_test_pool().await.unwrap());
        let mut bad = record("1", "x", DownloadStatus::Pending);
        bad.status = DownloadStatus::Success;

        assert!(repo.upsert(&bad).await.is_err());
    }
}
