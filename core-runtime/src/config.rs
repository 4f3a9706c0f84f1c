//! # Core Configuration
//!
//! [`CoreConfig`] carries everything the composition root needs: where the
//! catalog database lives, which host bridges to use, and the tuning knobs of
//! the event bus and download queue.
//!
//! ## Bridges
//!
//! | Bridge | Required | Desktop default (`desktop-shims`) |
//! |--------|----------|-----------------------------------|
//! | `HttpClient` | yes | `ReqwestHttpClient` |
//! | `FileSystemAccess` | yes | `TokioFileSystem` |
//! | `SettingsStore` | yes | `SqliteSettingsStore` on the catalog pool (filled by `core-service`) |
//! | `MediaServerClient` | no | `NavidromeClient` (filled by `core-service`) |
//!
//! Without `desktop-shims` every required bridge must be injected, otherwise
//! [`CoreConfigBuilder::build`] fails with [`Error::CapabilityMissing`].
//!
//! ## Example
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/home/ana/.local/share/musicboom/library.db")
//!     .max_concurrent_downloads(2)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use crate::logging::LoggingConfig;
use bridge_traits::{FileSystemAccess, HttpClient, MediaServerClient, SettingsStore};
use std::path::PathBuf;
use std::sync::Arc;

/// Default number of transfers allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;

/// Upper bound for [`CoreConfig::max_concurrent_downloads`].
pub const MAX_CONCURRENT_DOWNLOADS_LIMIT: usize = 16;

#[derive(Clone)]
pub struct CoreConfig {
    /// SQLite catalog path (local songs, downloads, recent plays, settings)
    pub database_path: PathBuf,

    pub http_client: Option<Arc<dyn HttpClient>>,

    pub file_system: Option<Arc<dyn FileSystemAccess>>,

    /// `None` only with `desktop-shims`; the service opens one on the catalog pool
    pub settings_store: Option<Arc<dyn SettingsStore>>,

    /// Remote catalog client; `core-service` falls back to Navidrome
    pub media_server: Option<Arc<dyn MediaServerClient>>,

    pub event_buffer_size: usize,

    pub max_concurrent_downloads: usize,

    /// Installed as the global subscriber when present
    pub logging: Option<LoggingConfig>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field(
                "file_system",
                &self
                    .file_system
                    .as_ref()
                    .map(|_| "FileSystemAccess { ... }"),
            )
            .field(
                "settings_store",
                &self
                    .settings_store
                    .as_ref()
                    .map(|_| "SettingsStore { ... }"),
            )
            .field(
                "media_server",
                &self
                    .media_server
                    .as_ref()
                    .map(|_| "MediaServerClient { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .field("max_concurrent_downloads", &self.max_concurrent_downloads)
            .field("logging", &self.logging)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Check invariants that the builder cannot express in types.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_downloads == 0 {
            return Err(Error::Config(
                "At least one concurrent download must be allowed".to_string(),
            ));
        }

        if self.max_concurrent_downloads > MAX_CONCURRENT_DOWNLOADS_LIMIT {
            return Err(Error::Config(format!(
                "Concurrent downloads exceed maximum of {}",
                MAX_CONCURRENT_DOWNLOADS_LIMIT
            )));
        }

        if self.http_client.is_none() {
            return Err(capability_missing(
                "HttpClient",
                "required for catalog requests, streaming and downloads",
            ));
        }

        if self.file_system.is_none() {
            return Err(capability_missing(
                "FileSystemAccess",
                "required for local files, the stream cache and downloads",
            ));
        }

        if self.settings_store.is_none() && !cfg!(feature = "desktop-shims") {
            return Err(capability_missing(
                "SettingsStore",
                "required for player preferences and the playback snapshot",
            ));
        }

        Ok(())
    }
}

fn capability_missing(capability: &str, purpose: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is {}. \
             Desktop: enable the 'desktop-shims' feature to use the default adapters. \
             Other hosts: inject a platform implementation through CoreConfig::builder().",
            capability, purpose
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn default_http_client() -> Option<Arc<dyn HttpClient>> {
    Some(Arc::new(bridge_desktop::ReqwestHttpClient::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_http_client() -> Option<Arc<dyn HttpClient>> {
    None
}

#[cfg(feature = "desktop-shims")]
fn default_file_system() -> Option<Arc<dyn FileSystemAccess>> {
    Some(Arc::new(bridge_desktop::TokioFileSystem::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_file_system() -> Option<Arc<dyn FileSystemAccess>> {
    None
}

#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    media_server: Option<Arc<dyn MediaServerClient>>,
    event_buffer_size: Option<usize>,
    max_concurrent_downloads: Option<usize>,
    logging: Option<LoggingConfig>,
}

impl CoreConfigBuilder {
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn media_server(mut self, client: Arc<dyn MediaServerClient>) -> Self {
        self.media_server = Some(client);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn max_concurrent_downloads(mut self, count: usize) -> Self {
        self.max_concurrent_downloads = Some(count);
        self
    }

    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let config = CoreConfig {
            database_path,
            http_client: self.http_client.or_else(default_http_client),
            file_system: self.file_system.or_else(default_file_system),
            settings_store: self.settings_store,
            media_server: self.media_server,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            max_concurrent_downloads: self
                .max_concurrent_downloads
                .unwrap_or(DEFAULT_MAX_CONCURRENT_DOWNLOADS),
            logging: self.logging,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse, HttpStream};
    use bridge_traits::storage::FileMetadata;
    use std::path::Path;

    struct NoopHttp;

    #[async_trait]
    impl HttpClient for NoopHttp {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            unimplemented!()
        }

        async fn download_stream(&self, _url: String) -> BridgeResult<HttpStream> {
            unimplemented!()
        }
    }

    struct NoopFs;

    #[async_trait]
    impl FileSystemAccess for NoopFs {
        async fn exists(&self, _path: &Path) -> BridgeResult<bool> {
            Ok(false)
        }
        async fn metadata(&self, _path: &Path) -> BridgeResult<FileMetadata> {
            unimplemented!()
        }
        async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn rename(&self, _from: &Path, _to: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn delete_file(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn open_write_stream(
            &self,
            _path: &Path,
        ) -> BridgeResult<Box<dyn tokio::io::AsyncWrite + Send + Unpin>> {
            Ok(Box::new(tokio::io::sink()))
        }
    }

    struct NoopSettings;

    #[async_trait]
    impl SettingsStore for NoopSettings {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }
        async fn delete(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn injected() -> CoreConfigBuilder {
        CoreConfig::builder()
            .http_client(Arc::new(NoopHttp))
            .file_system(Arc::new(NoopFs))
            .settings_store(Arc::new(NoopSettings))
    }

    #[test]
    fn test_builder_requires_database_path() {
        let err = injected().build().unwrap_err();
        assert!(err.to_string().contains("Database path is required"));
    }

    #[test]
    fn test_builder_defaults() {
        let config = injected().database_path("/db/library.db").build().unwrap();

        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert_eq!(config.max_concurrent_downloads, DEFAULT_MAX_CONCURRENT_DOWNLOADS);
        assert!(config.media_server.is_none());
        assert!(config.logging.is_none());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = injected()
            .database_path("/db/library.db")
            .max_concurrent_downloads(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_concurrency_upper_bound() {
        let result = injected()
            .database_path("/db/library.db")
            .max_concurrent_downloads(MAX_CONCURRENT_DOWNLOADS_LIMIT + 1)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_event_buffer_rejected() {
        let result = injected()
            .database_path("/db/library.db")
            .event_buffer_size(0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = injected().database_path("/db/library.db").build().unwrap();
        let printed = format!("{:?}", config);
        assert!(printed.contains("HttpClient { ... }"));
        assert!(printed.contains("library.db"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_settings_store_is_capability_error() {
        let err = CoreConfig::builder()
            .database_path("/db/library.db")
            .http_client(Arc::new(NoopHttp))
            .file_system(Arc::new(NoopFs))
            .build()
            .unwrap_err();

        match err {
            Error::CapabilityMissing { capability, .. } => assert_eq!(capability, "SettingsStore"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_desktop_defaults_fill_bridges() {
        let config = CoreConfig::builder()
            .database_path("/db/library.db")
            .build()
            .unwrap();

        assert!(config.http_client.is_some());
        assert!(config.file_system.is_some());
        assert!(config.settings_store.is_none());
    }
}
