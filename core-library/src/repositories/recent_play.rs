//! Recently played list, capped at [`RECENT_PLAYS_LIMIT`] rows.

use crate::error::Result;
use crate::models::{RecentPlay, RECENT_PLAYS_LIMIT};
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

#[async_trait]
pub trait RecentPlayRepository: Send + Sync {
    /// Upsert `play` and drop everything beyond the newest
    /// [`RECENT_PLAYS_LIMIT`] entries.
    async fn record(&self, play: &RecentPlay) -> Result<()>;

    /// Newest first. `limit` is clamped to `1..=RECENT_PLAYS_LIMIT`.
    async fn list(&self, limit: i64) -> Result<Vec<RecentPlay>>;
}

/// SQLite implementation of RecentPlayRepository
pub struct SqliteRecentPlayRepository {
    pool: SqlitePool,
}

impl SqliteRecentPlayRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecentPlayRepository for SqliteRecentPlayRepository {
    async fn record(&self, play: &RecentPlay) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            REPLACE INTO recent_plays (
                song_id, title, artist, album, duration, created, cover_url, last_played
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&play.song_id)
        .bind(&play.title)
        .bind(&play.artist)
        .bind(&play.album)
        .bind(play.duration)
        .bind(&play.created)
        .bind(&play.cover_url)
        .bind(play.last_played)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM recent_plays WHERE song_id NOT IN (
                SELECT song_id FROM recent_plays ORDER BY last_played DESC LIMIT ?
            )
            "#,
        )
        .bind(RECENT_PLAYS_LIMIT)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, limit: i64) -> Result<Vec<RecentPlay>> {
        let limit = limit.clamp(1, RECENT_PLAYS_LIMIT);
        let plays = query_as::<_, RecentPlay>(
            "SELECT * FROM recent_plays ORDER BY last_played DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(plays)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::Track;

    fn play(id: &str, at: i64) -> RecentPlay {
        RecentPlay::from_track(&Track::new(id, id, "Artist", "Album").with_duration(180.0), at)
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let repo = SqliteRecentPlayRepository::new(create_test_pool().await.unwrap());
        repo.record(&play("a", 100)).await.unwrap();
        repo.record(&play("b", 300)).await.unwrap();
        repo.record(&play("c", 200)).await.unwrap();

        let ids: Vec<String> = repo.list(10).await.unwrap().into_iter().map(|p| p.song_id).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_replay_moves_song_to_front() {
        let repo = SqliteRecentPlayRepository::new(create_test_pool().await.unwrap());
        repo.record(&play("a", 100)).await.unwrap();
        repo.record(&play("b", 200)).await.unwrap();
        repo.record(&play("a", 300)).await.unwrap();

        let plays = repo.list(10).await.unwrap();
        assert_eq!(plays.len(), 2);
        assert_eq!(plays[0].song_id, "a");
        assert_eq!(plays[0].last_played, 300);
    }

    #[tokio::test]
    async fn test_limit_is_clamped() {
        let repo = SqliteRecentPlayRepository::new(create_test_pool().await.unwrap());
        for i in 0..3 {
            repo.record(&play(&format!("s{}", i), i)).await.unwrap();
        }

        assert_eq!(repo.list(0).await.unwrap().len(), 1);
        assert_eq!(repo.list(-5).await.unwrap().len(), 1);
        assert_eq!(repo.list(10_000).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_prunes_beyond_cap() {
        let repo = SqliteRecentPlayRepository::new(create_test_pool().await.unwrap());
        for i in 0..(RECENT_PLAYS_LIMIT + 5) {
            repo.record(&play(&format!("s{}", i), i)).await.unwrap();
        }

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recent_plays")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(count, RECENT_PLAYS_LIMIT);

        let oldest = repo.list(RECENT_PLAYS_LIMIT).await.unwrap();
        assert_eq!(oldest.last().unwrap().song_id, "s5");
    }
}
