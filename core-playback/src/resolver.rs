//! # Source Resolver
//!
//! Picks the single best playable source for a track, first match wins:
//!
//! 1. **Local** - an imported file whose path still exists
//! 2. **Downloaded** - a `success` download record whose file still exists
//! 3. **Cached** - `{cache_dir}/{track_id}.{ext}` already on disk
//! 4. **Online** - the media server's stream URL, copied into the cache first
//!    when a cache directory is configured
//!
//! Lookup failures in steps 1-3 count as misses. A failed cache fill falls
//! back to the raw stream URL. Only failing to build the stream URL is an
//! error.
//!
//! Cache fills stream into a `.part` sibling and are renamed into place once
//! complete, so a cache hit is always a whole file. Only one fill per track
//! runs at a time; an overlapping resolution of the same track streams online
//! instead of touching the running fill's `.part` file.

use crate::config::ResolverConfig;
use crate::error::{PlaybackError, Result};
use crate::source::{PlayableSource, SourceKind};
use async_trait::async_trait;
use bridge_traits::http::HttpClient;
use bridge_traits::media::{AuthContext, MediaServerClient, Track};
use bridge_traits::storage::{partial_path, FileSystemAccess, SettingsStore};
use core_library::models::DownloadStatus;
use core_library::repositories::{DownloadRepository, LocalSongRepository};
use core_runtime::logging::{redact_if_sensitive, strip_path};
use core_runtime::settings::DownloadSettings;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// Produces a playable source for a track.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, track: &Track, auth: &AuthContext) -> Result<PlayableSource>;
}

/// Catalog- and cache-aware resolver
pub struct SourceResolver {
    local_songs: Arc<dyn LocalSongRepository>,
    downloads: Arc<dyn DownloadRepository>,
    settings: Arc<dyn SettingsStore>,
    file_system: Arc<dyn FileSystemAccess>,
    http_client: Arc<dyn HttpClient>,
    media_server: Arc<dyn MediaServerClient>,
    config: ResolverConfig,
    active_fills: Arc<Mutex<HashSet<String>>>,
}

/// Holds a track's cache-fill slot; released on drop, including when the
/// fill future is dropped by a timeout.
struct FillSlot {
    track_id: String,
    active_fills: Arc<Mutex<HashSet<String>>>,
}

impl Drop for FillSlot {
    fn drop(&mut self) {
        self.active_fills.lock().remove(&self.track_id);
    }
}

impl SourceResolver {
    pub fn new(
        local_songs: Arc<dyn LocalSongRepository>,
        downloads: Arc<dyn DownloadRepository>,
        settings: Arc<dyn SettingsStore>,
        file_system: Arc<dyn FileSystemAccess>,
        http_client: Arc<dyn HttpClient>,
        media_server: Arc<dyn MediaServerClient>,
    ) -> Self {
        Self {
            local_songs,
            downloads,
            settings,
            file_system,
            http_client,
            media_server,
            config: ResolverConfig::default(),
            active_fills: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// `{cache_dir}/{track_id}.{ext}`
    pub fn cache_path(&self, cache_dir: &Path, track_id: &str) -> PathBuf {
        cache_dir.join(format!("{}.{}", track_id, self.config.cache_extension))
    }

    async fn exists(&self, path: &Path) -> bool {
        match self.file_system.exists(path).await {
            Ok(found) => found,
            Err(e) => {
                debug!(error = %e, file = strip_path(&path.to_string_lossy()), "Existence check failed");
                false
            }
        }
    }

    async fn find_local(&self, track_id: &str) -> Option<PathBuf> {
        let song = match self.local_songs.find_by_id(track_id).await {
            Ok(song) => song?,
            Err(e) => {
                debug!(error = %e, "Local catalog lookup failed");
                return None;
            }
        };
        let path = PathBuf::from(song.path);
        self.exists(&path).await.then_some(path)
    }

    async fn find_downloaded(&self, track_id: &str) -> Option<PathBuf> {
        let record = match self.downloads.find_by_id(track_id).await {
            Ok(record) => record?,
            Err(e) => {
                debug!(error = %e, "Download catalog lookup failed");
                return None;
            }
        };
        if record.status != DownloadStatus::Success {
            return None;
        }
        let path = PathBuf::from(record.file_path?);
        self.exists(&path).await.then_some(path)
    }

    /// Cache file path for `track_id` with its directory created, if caching is on
    async fn prepare_cache_path(&self, track_id: &str) -> Option<PathBuf> {
        let cache_dir = DownloadSettings::load(self.settings.as_ref()).await.cache_dir()?;
        if let Err(e) = self.file_system.create_dir_all(&cache_dir).await {
            warn!(error = %e, "Cannot create cache directory, streaming directly");
            return None;
        }
        Some(self.cache_path(&cache_dir, track_id))
    }

    /// Claim the fill slot for `track_id`, or `None` while another fill runs
    fn claim_fill(&self, track_id: &str) -> Option<FillSlot> {
        if !self.active_fills.lock().insert(track_id.to_string()) {
            return None;
        }
        Some(FillSlot {
            track_id: track_id.to_string(),
            active_fills: self.active_fills.clone(),
        })
    }

    /// Whether a cache fill for `track_id` is running
    pub fn is_filling(&self, track_id: &str) -> bool {
        self.active_fills.lock().contains(track_id)
    }

    /// Stream `url` into `target` through a `.part` file
    async fn fill_cache(&self, url: &str, target: &Path) -> Result<u64> {
        let partial = partial_path(target);
        let result = self.copy_stream(url, &partial).await;

        match result {
            Ok(written) => {
                self.file_system.rename(&partial, target).await?;
                Ok(written)
            }
            Err(e) => {
                let _ = self.file_system.delete_file(&partial).await;
                Err(e)
            }
        }
    }

    async fn copy_stream(&self, url: &str, partial: &Path) -> Result<u64> {
        let mut stream = self.http_client.download_stream(url.to_string()).await?;
        let mut writer = self.file_system.open_write_stream(partial).await?;

        let written = tokio::io::copy(&mut stream.reader, &mut writer)
            .await
            .map_err(bridge_traits::error::BridgeError::from)?;
        writer
            .shutdown()
            .await
            .map_err(bridge_traits::error::BridgeError::from)?;

        if let Some(expected) = stream.content_length {
            if written != expected {
                return Err(PlaybackError::Internal(format!(
                    "stream ended after {} of {} bytes",
                    written, expected
                )));
            }
        }
        Ok(written)
    }
}

#[async_trait]
impl TrackResolver for SourceResolver {
    #[instrument(skip(self, track, auth), fields(track_id = %track.id))]
    async fn resolve(&self, track: &Track, auth: &AuthContext) -> Result<PlayableSource> {
        if let Some(path) = self.find_local(&track.id).await {
            debug!("Playing local file");
            return Ok(PlayableSource::file(&track.id, SourceKind::Local, path));
        }

        if let Some(path) = self.find_downloaded(&track.id).await {
            debug!("Playing downloaded file");
            return Ok(PlayableSource::file(&track.id, SourceKind::Downloaded, path));
        }

        let cache_path = self.prepare_cache_path(&track.id).await;
        if let Some(path) = &cache_path {
            if self.exists(path).await {
                debug!("Playing cached file");
                return Ok(PlayableSource::file(&track.id, SourceKind::Cached, path.clone()));
            }
        }

        let stream_url = self
            .media_server
            .build_stream_url(auth, &track.id)
            .map_err(|e| PlaybackError::ResolutionExhausted {
                track_id: track.id.clone(),
                reason: e.to_string(),
            })?;

        let Some(path) = cache_path.filter(|_| self.config.fill_cache) else {
            return Ok(PlayableSource::online(&track.id, stream_url));
        };

        let Some(_slot) = self.claim_fill(&track.id) else {
            debug!("Cache fill already running, streaming directly");
            return Ok(PlayableSource::online(&track.id, stream_url));
        };

        debug!(url = %redact_if_sensitive("url", &stream_url), "Filling stream cache");
        match tokio::time::timeout(self.config.fill_timeout, self.fill_cache(&stream_url, &path)).await {
            Ok(Ok(bytes)) => {
                info!(bytes, "Filled stream cache");
                Ok(PlayableSource::file(&track.id, SourceKind::Cached, path))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Cache fill failed, streaming directly");
                Ok(PlayableSource::online(&track.id, stream_url))
            }
            Err(_) => {
                warn!("Cache fill timed out, streaming directly");
                let _ = self.file_system.delete_file(&partial_path(&path)).await;
                Ok(PlayableSource::online(&track.id, stream_url))
            }
        }
    }
}
