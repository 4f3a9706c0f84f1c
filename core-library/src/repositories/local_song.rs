//! Local song repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::LocalSong;
use crate::repositories::delete_where_in;
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

/// Access to the `local_music` table
#[async_trait]
pub trait LocalSongRepository: Send + Sync {
    /// Insert or replace a song by id
    async fn upsert(&self, song: &LocalSong) -> Result<()>;

    /// Find a song by id
    async fn find_by_id(&self, id: &str) -> Result<Option<LocalSong>>;

    /// All songs ordered by title, case-insensitively
    async fn list(&self) -> Result<Vec<LocalSong>>;

    /// Delete the given ids, returning how many rows went away
    async fn delete_many(&self, ids: &[String]) -> Result<u64>;
}

/// SQLite implementation of LocalSongRepository
pub struct SqliteLocalSongRepository {
    pool: SqlitePool,
}

impl SqliteLocalSongRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LocalSongRepository for SqliteLocalSongRepository {
    async fn upsert(&self, song: &LocalSong) -> Result<()> {
        song.validate()
            .map_err(|msg| LibraryError::invalid("local_song", msg))?;

        sqlx::query(
            r#"
            REPLACE INTO local_music (id, title, artist, album, size, path, created)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&song.id)
        .bind(&song.title)
        .bind(&song.artist)
        .bind(&song.album)
        .bind(song.size)
        .bind(&song.path)
        .bind(&song.created)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<LocalSong>> {
        let song = query_as::<_, LocalSong>("SELECT * FROM local_music WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(song)
    }

    async fn list(&self) -> Result<Vec<LocalSong>> {
        let songs =
            query_as::<_, LocalSong>("SELECT * FROM local_music ORDER BY title COLLATE NOCASE")
                .fetch_all(&self.pool)
                .await?;

        Ok(songs)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<u64> {
        delete_where_in(&self.pool, "local_music", "id", ids).await
    }
}
