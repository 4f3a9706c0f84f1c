//! [`FileSystemAccess`] over `tokio::fs`

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::debug;

const APP_DIR_NAME: &str = "musicboom";
const DATABASE_FILE_NAME: &str = "library.db";

/// Platform location of the catalog database
/// (`~/.local/share/musicboom/library.db` on Linux).
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(DATABASE_FILE_NAME)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    pub fn new() -> Self {
        Self
    }

    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.create_dir_all(parent).await,
            _ => Ok(()),
        }
    }
}

fn unix_seconds(time: std::io::Result<SystemTime>) -> Option<i64> {
    let since_epoch = time.ok()?.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(since_epoch.as_secs()).ok()
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await?;
        Ok(FileMetadata {
            size: metadata.len(),
            modified_at: unix_seconds(metadata.modified()),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.ensure_parent(to).await?;
        fs::rename(from, to).await?;
        debug!(from = ?from.file_name(), to = ?to.file_name(), "Renamed file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(BridgeError::Io)
    }

    async fn open_write_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn tokio::io::AsyncWrite + Send + Unpin>> {
        self.ensure_parent(path).await?;
        let file = fs::File::create(path).await?;
        Ok(Box::new(file))
    }
}
