//! # Catalog Repositories
//!
//! One repository per table. Traits define the interface so services can be
//! tested against in-memory pools or mocks; the SQLite implementations use
//! `sqlx` with runtime-checked queries.
//!
//! - `LocalSongRepository` - user-imported files (`local_music`)
//! - `DownloadRepository` - persisted download records (`downloads`)
//! - `RecentPlayRepository` - recently played list (`recent_plays`)

pub mod download;
pub mod local_song;
pub mod recent_play;

pub use download::{DownloadRepository, SqliteDownloadRepository};
pub use local_song::{LocalSongRepository, SqliteLocalSongRepository};
pub use recent_play::{RecentPlayRepository, SqliteRecentPlayRepository};

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

/// `DELETE FROM <table> WHERE <column> IN (...)`, returning affected rows.
///
/// An empty id list is a no-op.
pub(crate) async fn delete_where_in(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    ids: &[String],
) -> crate::Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("DELETE FROM {} WHERE {} IN (", table, column));
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}
