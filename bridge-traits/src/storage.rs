//! Storage and File System Abstractions
//!
//! Provides platform-agnostic traits for file I/O and key-value settings
//! storage. The playback resolver, the download manager and the local
//! library importer all go through [`FileSystemAccess`]; player preferences
//! and snapshots go through [`SettingsStore`].

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// What the core needs to know about a path on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u64,
    /// Seconds since the Unix epoch, when the platform reports it
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File access for the stream cache, downloads and local imports.
///
/// Large files are only ever written as streams into a `.part` sibling (see
/// [`partial_path`]) and published with [`rename`](Self::rename), so the
/// trait has no whole-file write.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::{partial_path, FileSystemAccess};
///
/// async fn publish(fs: &dyn FileSystemAccess, target: &Path) -> Result<()> {
///     fs.rename(&partial_path(target), target).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all missing parents
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Rename a file, replacing the destination if it exists
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Open a file for streaming writes, truncating any previous content.
    ///
    /// Parent directories are created as needed.
    async fn open_write_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn tokio::io::AsyncWrite + Send + Unpin>>;
}

/// Sibling path used while a file is still being written (`song.mp3.part`).
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Key-value settings storage trait
///
/// Values are opaque strings; structured values are stored as JSON through
/// [`SettingsStoreExt`].
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::{SettingsStore, SettingsStoreExt};
///
/// async fn save_volume(store: &dyn SettingsStore) -> Result<()> {
///     store.write_json("player.volume", &0.8f64).await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;
}

/// Typed JSON access on top of any [`SettingsStore`].
#[async_trait]
pub trait SettingsStoreExt: SettingsStore {
    /// Read and decode a JSON value. A missing key or a stored `null` is `None`.
    async fn read_json<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get_string(key).await? {
            Some(raw) => Ok(serde_json::from_str::<Option<T>>(&raw)?),
            None => Ok(None),
        }
    }

    /// Encode and store a JSON value.
    async fn write_json<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let raw = serde_json::to_string(value)?;
        self.set_string(key, &raw).await
    }
}

impl<S: SettingsStore + ?Sized> SettingsStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        values: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl SettingsStore for MemoryStore {
        async fn set_string(&self, key: &str, value: &str) -> Result<()> {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get_string(&self, key: &str) -> Result<Option<String>> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }

        async fn list_keys(&self) -> Result<Vec<String>> {
            Ok(self.values.lock().unwrap().keys().cloned().collect())
        }
    }

    #[test]
    fn test_partial_path() {
        let path = Path::new("/music/Album/song.mp3");
        assert_eq!(partial_path(path), PathBuf::from("/music/Album/song.mp3.part"));
    }

    #[tokio::test]
    async fn test_json_round_trip() {
        let store = MemoryStore::default();
        store.write_json("player.volume", &0.25f64).await.unwrap();

        let volume: Option<f64> = store.read_json("player.volume").await.unwrap();
        assert_eq!(volume, Some(0.25));
        assert!(store.has_key("player.volume").await.unwrap());
    }

    #[tokio::test]
    async fn test_null_reads_as_none() {
        let store = MemoryStore::default();
        store.set_string("player.snapshot", "null").await.unwrap();

        let value: Option<HashMap<String, String>> =
            store.read_json("player.snapshot").await.unwrap();
        assert!(value.is_none());

        let missing: Option<f64> = store.read_json("missing").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_malformed_json_is_error() {
        let store = MemoryStore::default();
        store.set_string("player.volume", "not-json").await.unwrap();

        let result: Result<Option<f64>> = store.read_json("player.volume").await;
        assert!(result.is_err());
    }
}
