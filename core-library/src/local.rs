//! Importing user audio files into the local catalog.

use crate::error::{LibraryError, Result};
use crate::models::LocalSong;
use crate::repositories::LocalSongRepository;
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use core_runtime::logging::strip_path;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Artist and album recorded for imported files
pub const LOCAL_FILE_LABEL: &str = "Local File";
const UNKNOWN_FILE_TITLE: &str = "Unknown File";

/// Local songs catalog with import and removal.
///
/// Removing a song only forgets the record; the file on disk is left alone.
pub struct LocalLibrary {
    repository: Arc<dyn LocalSongRepository>,
    file_system: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    events: Option<EventBus>,
}

impl LocalLibrary {
    pub fn new(
        repository: Arc<dyn LocalSongRepository>,
        file_system: Arc<dyn FileSystemAccess>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            file_system,
            clock,
            events: None,
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Record the file at `path` as a new local song.
    #[instrument(skip(self, path))]
    pub async fn import_from_path(&self, path: &Path) -> Result<LocalSong> {
        let shown = path.to_string_lossy();
        debug!(file = strip_path(&shown), "Importing local file");

        let metadata = self.file_system.metadata(path).await?;
        if metadata.is_directory {
            return Err(LibraryError::invalid(
                "path",
                format!("{} is a directory", path.display()),
            ));
        }

        let title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().trim().to_string())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| UNKNOWN_FILE_TITLE.to_string());

        let song = LocalSong {
            id: Uuid::new_v4().to_string(),
            title,
            artist: LOCAL_FILE_LABEL.to_string(),
            album: LOCAL_FILE_LABEL.to_string(),
            size: i64::try_from(metadata.size).unwrap_or(i64::MAX),
            path: path.to_string_lossy().into_owned(),
            created: Some(self.clock.now().to_rfc3339()),
        };

        self.repository.upsert(&song).await?;
        info!(song_id = %song.id, "Imported local song");

        self.emit(LibraryEvent::LocalSongAdded {
            song_id: song.id.clone(),
            title: song.title.clone(),
        });
        Ok(song)
    }

    /// Import several files, skipping the ones that fail
    pub async fn import_many(&self, paths: &[&Path]) -> Vec<LocalSong> {
        let mut imported = Vec::with_capacity(paths.len());
        for path in paths {
            match self.import_from_path(path).await {
                Ok(song) => imported.push(song),
                Err(e) => debug!(error = %e, "Skipping file that could not be imported"),
            }
        }
        imported
    }

    /// Forget the given songs, returning how many records were removed
    #[instrument(skip(self))]
    pub async fn remove(&self, ids: &[String]) -> Result<u64> {
        let removed = self.repository.delete_many(ids).await?;
        if removed > 0 {
            for id in ids {
                self.emit(LibraryEvent::LocalSongRemoved {
                    song_id: id.clone(),
                });
            }
        }
        Ok(removed)
    }

    pub async fn list(&self) -> Result<Vec<LocalSong>> {
        self.repository.list().await
    }

    pub async fn find(&self, id: &str) -> Result<Option<LocalSong>> {
        self.repository.find_by_id(id).await
    }

    fn emit(&self, event: LibraryEvent) {
        if let Some(bus) = &self.events {
            // No subscribers is fine.
            let _ = bus.emit(CoreEvent::Library(event));
        }
    }
}
