//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, filesystem,
//! settings, media server) into the shared Rust core. Desktop apps typically
//! enable the `desktop-shims` feature (which depends on `bridge-desktop`);
//! other hosts inject every required bridge through
//! [`CoreConfig::builder`](core_runtime::config::CoreConfig::builder).
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::MusicCore;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/home/ana/.local/share/musicboom/library.db")
//!     .build()?;
//! let core = MusicCore::bootstrap(config).await?;
//! core.session().play_from_list(tracks, "song-42", auth).await;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::fmt;
use std::sync::Arc;

use bridge_traits::{Clock, MediaServerClient, SettingsStore, SystemClock};
use core_download::{DownloadConfig, DownloadManager, HttpTrackTransfer};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::repositories::{
    SqliteDownloadRepository, SqliteLocalSongRepository, SqliteRecentPlayRepository,
};
use core_library::{LocalLibrary, PlayHistory};
use core_playback::{AudioOutput, NullAudioOutput, SessionController, SnapshotStore, SourceResolver};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use core_runtime::logging::init_logging;
use core_runtime::settings::DownloadSettings;
use provider_navidrome::NavidromeClient;
use sqlx::SqlitePool;
use tracing::{info, instrument};

/// Primary façade exposed to host applications.
///
/// Owns one instance of every service; clones share them.
#[derive(Clone)]
pub struct MusicCore {
    events: EventBus,
    settings: Arc<dyn SettingsStore>,
    media_server: Arc<dyn MediaServerClient>,
    local_library: Arc<LocalLibrary>,
    history: Arc<PlayHistory>,
    resolver: Arc<SourceResolver>,
    session: Arc<SessionController>,
    downloads: DownloadManager,
}

impl MusicCore {
    /// Build the core with a silent audio output.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        Self::bootstrap_with_output(config, Arc::new(NullAudioOutput)).await
    }

    /// Build every service from `config`, driving `output` for playback.
    ///
    /// Opens (and migrates) the catalog database, loads player preferences
    /// and marks downloads left unfinished by an earlier run as failed.
    #[instrument(skip(config, output), fields(database = ?config.database_path))]
    pub async fn bootstrap_with_output(
        config: CoreConfig,
        output: Arc<dyn AudioOutput>,
    ) -> Result<Self> {
        if let Some(logging) = config.logging.clone() {
            init_logging(logging)?;
        }

        let http_client = required(config.http_client.clone(), "HttpClient")?;
        let file_system = required(config.file_system.clone(), "FileSystemAccess")?;

        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                file_system.create_dir_all(parent).await?;
            }
        }
        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;

        let settings = match config.settings_store.clone() {
            Some(store) => store,
            None => default_settings_store(&pool).await?,
        };
        let media_server: Arc<dyn MediaServerClient> = match config.media_server.clone() {
            Some(client) => client,
            None => Arc::new(NavidromeClient::new(http_client.clone())),
        };

        let events = EventBus::new(config.event_buffer_size);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let local_songs = Arc::new(SqliteLocalSongRepository::new(pool.clone()));
        let download_records = Arc::new(SqliteDownloadRepository::new(pool.clone()));
        let recent_plays = Arc::new(SqliteRecentPlayRepository::new(pool));

        let local_library = Arc::new(
            LocalLibrary::new(local_songs.clone(), file_system.clone(), clock.clone())
                .with_event_bus(events.clone()),
        );
        let history = Arc::new(
            PlayHistory::new(recent_plays, clock.clone()).with_event_bus(events.clone()),
        );

        let resolver = Arc::new(SourceResolver::new(
            local_songs,
            download_records.clone(),
            settings.clone(),
            file_system.clone(),
            http_client.clone(),
            media_server.clone(),
        ));

        let session = Arc::new(
            SessionController::new(
                resolver.clone(),
                output,
                SnapshotStore::new(settings.clone()),
                media_server.clone(),
                clock,
                events.clone(),
            )
            .with_play_history(history.clone()),
        );
        session.load_preferences().await;

        let download_config = DownloadConfig::builder()
            .max_concurrent_downloads(config.max_concurrent_downloads)
            .build()?;
        let downloads = DownloadManager::new(
            download_records,
            settings.clone(),
            file_system.clone(),
            media_server.clone(),
            Arc::new(HttpTrackTransfer::from_config(
                http_client,
                file_system,
                &download_config,
            )),
            download_config,
        )?
        .with_event_bus(events.clone());

        let interrupted = downloads.recover_interrupted().await?;
        info!(interrupted = interrupted.len(), "Music core ready");

        Ok(Self {
            events,
            settings,
            media_server,
            local_library,
            history,
            resolver,
            session,
            downloads,
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    pub fn downloads(&self) -> &DownloadManager {
        &self.downloads
    }

    pub fn resolver(&self) -> &Arc<SourceResolver> {
        &self.resolver
    }

    pub fn local_library(&self) -> &Arc<LocalLibrary> {
        &self.local_library
    }

    pub fn history(&self) -> &Arc<PlayHistory> {
        &self.history
    }

    pub fn media_server(&self) -> &Arc<dyn MediaServerClient> {
        &self.media_server
    }

    /// Current download/cache directories and naming options
    pub async fn download_settings(&self) -> DownloadSettings {
        DownloadSettings::load(self.settings.as_ref()).await
    }

    /// Store new download settings; the next resolution or download uses them
    pub async fn save_download_settings(&self, settings: &DownloadSettings) -> Result<()> {
        settings.save(self.settings.as_ref()).await?;
        info!("Download settings updated");
        Ok(())
    }
}

impl fmt::Debug for MusicCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MusicCore")
            .field("session", &self.session)
            .field("downloads", &self.downloads)
            .field("subscribers", &self.events.subscriber_count())
            .finish()
    }
}

fn required<T: ?Sized>(bridge: Option<Arc<T>>, capability: &str) -> Result<Arc<T>> {
    bridge.ok_or_else(|| CoreError::CapabilityMissing {
        capability: capability.to_string(),
        message: "not provided and no desktop default is available".to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
async fn default_settings_store(pool: &SqlitePool) -> Result<Arc<dyn SettingsStore>> {
    let store = bridge_desktop::SqliteSettingsStore::from_pool(pool.clone()).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
async fn default_settings_store(_pool: &SqlitePool) -> Result<Arc<dyn SettingsStore>> {
    Err(CoreError::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "enable 'desktop-shims' or inject one through CoreConfig::builder()".to_string(),
    })
}
