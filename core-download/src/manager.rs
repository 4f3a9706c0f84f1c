//! # Download Task Manager
//!
//! Runs song downloads concurrently, at most one live task per song id, and
//! keeps a persisted [`DownloadRecord`] in step with every transition.
//!
//! ## Lifecycle
//!
//! ```text
//! pending ──permit──> downloading ──> success
//!    │                    │
//!    └──────cancel────────┴──> cancelled (progress 0)
//!                         └──> failed (progress 0, message)
//! ```
//!
//! Failures are recorded on the task and never returned to the caller: the
//! final record is the outcome. A terminal task started again begins a new
//! lifecycle from `pending`.
//!
//! All record writes go through one async lock so the stored order matches
//! the in-memory order; a progress write can never land after the
//! cancellation that superseded it.

use crate::config::DownloadConfig;
use crate::error::{DownloadError, Result};
use crate::path::{resolve_target_path, PathReservations};
use crate::status;
use crate::transfer::{ProgressSink, TrackTransfer, TransferRequest};
use async_trait::async_trait;
use bridge_traits::media::{AuthContext, MediaServerClient, Track};
use bridge_traits::storage::{FileSystemAccess, SettingsStore};
use core_library::models::{DownloadRecord, DownloadStatus};
use core_library::repositories::DownloadRepository;
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use core_runtime::logging::strip_path;
use core_runtime::settings::DownloadSettings;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Error message stored on tasks found unfinished at startup
pub const INTERRUPTED_MESSAGE: &str = "interrupted before completion";

/// Clamp a raw transfer percentage to `0..=99`.
///
/// 100 is reserved for a confirmed completion. Non-finite input is dropped.
pub fn clamp_progress(percent: f64) -> Option<u8> {
    if !percent.is_finite() {
        return None;
    }
    Some(percent.round().clamp(0.0, 99.0) as u8)
}

struct TaskEntry {
    record: DownloadRecord,
    /// Distinguishes this lifecycle from earlier ones for the same song
    generation: u64,
    cancel: CancellationToken,
}

enum Enqueued {
    /// A task for this song is already pending or downloading
    InFlight(DownloadRecord),
    Fresh {
        record: DownloadRecord,
        generation: u64,
        cancel: CancellationToken,
    },
}

struct ManagerInner {
    repository: Arc<dyn DownloadRepository>,
    settings: Arc<dyn SettingsStore>,
    file_system: Arc<dyn FileSystemAccess>,
    media_server: Arc<dyn MediaServerClient>,
    transfer: Arc<dyn TrackTransfer>,
    config: DownloadConfig,
    permits: Arc<Semaphore>,
    tasks: Mutex<Vec<TaskEntry>>,
    reservations: PathReservations,
    write_lock: tokio::sync::Mutex<()>,
    next_generation: AtomicU64,
    events: Option<EventBus>,
}

/// Cloneable handle to the download queue.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<ManagerInner>,
}

impl DownloadManager {
    pub fn new(
        repository: Arc<dyn DownloadRepository>,
        settings: Arc<dyn SettingsStore>,
        file_system: Arc<dyn FileSystemAccess>,
        media_server: Arc<dyn MediaServerClient>,
        transfer: Arc<dyn TrackTransfer>,
        config: DownloadConfig,
    ) -> Result<Self> {
        config.validate()?;
        let permits = Arc::new(Semaphore::new(config.max_concurrent_downloads));

        Ok(Self {
            inner: Arc::new(ManagerInner {
                repository,
                settings,
                file_system,
                media_server,
                transfer,
                config,
                permits,
                tasks: Mutex::new(Vec::new()),
                reservations: PathReservations::new(),
                write_lock: tokio::sync::Mutex::new(()),
                next_generation: AtomicU64::new(0),
                events: None,
            }),
        })
    }

    /// Publish [`DownloadEvent`]s on `events`.
    ///
    /// Must be called before the manager is cloned.
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.events = Some(events);
        } else {
            warn!("Download manager already shared, event bus not attached");
        }
        self
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Tasks known to this process, in start order
    pub fn tasks(&self) -> Vec<DownloadRecord> {
        self.inner
            .tasks
            .lock()
            .iter()
            .map(|entry| entry.record.clone())
            .collect()
    }

    pub fn task(&self, song_id: &str) -> Option<DownloadRecord> {
        self.inner
            .tasks
            .lock()
            .iter()
            .find(|entry| entry.record.song_id == song_id)
            .map(|entry| entry.record.clone())
    }

    /// Tasks currently pending or downloading
    pub fn active_count(&self) -> usize {
        self.inner
            .tasks
            .lock()
            .iter()
            .filter(|entry| entry.record.status.is_active())
            .count()
    }

    /// Persisted records, optionally filtered by status
    pub async fn list_records(&self, status: Option<DownloadStatus>) -> Result<Vec<DownloadRecord>> {
        Ok(self.inner.repository.list(status).await?)
    }

    pub async fn is_downloaded(&self, song_id: &str) -> Result<bool> {
        status::check_download_status(
            self.inner.repository.as_ref(),
            self.inner.file_system.as_ref(),
            song_id,
        )
        .await
    }

    pub async fn filter_undownloaded(&self, tracks: Vec<Track>) -> Result<Vec<Track>> {
        status::filter_undownloaded(
            self.inner.repository.as_ref(),
            self.inner.file_system.as_ref(),
            tracks,
        )
        .await
    }

    // ========================================================================
    // Start
    // ========================================================================

    /// Download `track` and return its final record.
    ///
    /// `path_hint` skips target path resolution. When the song already has a
    /// pending or downloading task, its metadata is refreshed and the current
    /// record is returned without starting a second transfer.
    #[instrument(skip(self, track, auth, path_hint), fields(song_id = %track.id))]
    pub async fn start(
        &self,
        track: Track,
        auth: AuthContext,
        path_hint: Option<PathBuf>,
    ) -> DownloadRecord {
        let (record, generation, cancel) = match self.inner.enqueue(&track, path_hint.as_deref()).await {
            Enqueued::InFlight(record) => {
                debug!("Download already in flight");
                return record;
            }
            Enqueued::Fresh {
                record,
                generation,
                cancel,
            } => (record, generation, cancel),
        };

        let mut last = record;
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(last),
            permit = self.inner.permits.clone().acquire_owned() => permit,
        };
        let Ok(_permit) = permit else {
            let err = DownloadError::Internal("download queue closed".to_string());
            return self.inner.fail(last, generation, &err).await;
        };

        let result = self
            .inner
            .run(&track, &auth, generation, &cancel, path_hint, &mut last)
            .await;

        match result {
            Ok(path) => self.inner.complete(last, generation, path).await,
            Err(e) if e.is_cancellation() || cancel.is_cancelled() => {
                debug!("Download cancelled");
                cancelled(last)
            }
            Err(e) => self.inner.fail(last, generation, &e).await,
        }
    }

    /// Run [`start`](Self::start) on the tokio runtime
    pub fn spawn(
        &self,
        track: Track,
        auth: AuthContext,
        path_hint: Option<PathBuf>,
    ) -> JoinHandle<DownloadRecord> {
        let manager = self.clone();
        tokio::spawn(async move { manager.start(track, auth, path_hint).await })
    }

    /// Start again from the persisted record of `song_id`.
    ///
    /// A previously resolved path is reused unless the earlier attempt
    /// succeeded.
    pub async fn retry(&self, song_id: &str, auth: AuthContext) -> Result<DownloadRecord> {
        let record = self
            .inner
            .repository
            .find_by_id(song_id)
            .await?
            .ok_or_else(|| DownloadError::TaskNotFound(song_id.to_string()))?;

        let hint = match record.status {
            DownloadStatus::Success => None,
            _ => record.file_path.as_ref().map(PathBuf::from),
        };
        let track = Track {
            id: record.song_id.clone(),
            title: record.title.clone(),
            artist: String::new(),
            album: record.album.clone(),
            duration: 0.0,
            cover_url: None,
            size: u64::try_from(record.size).ok().filter(|size| *size > 0),
            created: record.created.clone(),
        };

        Ok(self.start(track, auth, hint).await)
    }

    // ========================================================================
    // Cancel / clear
    // ========================================================================

    /// Abort a pending or downloading task.
    ///
    /// The record is stored as `cancelled` with progress 0 before the task
    /// leaves the in-memory list. Returns `false` when nothing was in flight.
    #[instrument(skip(self))]
    pub async fn cancel(&self, song_id: &str) -> Result<bool> {
        let inner = &self.inner;
        let _write = inner.write_lock.lock().await;

        let record = {
            let mut tasks = inner.tasks.lock();
            let Some(position) = tasks
                .iter()
                .position(|e| e.record.song_id == song_id && e.record.status.is_active())
            else {
                return Ok(false);
            };
            let mut entry = tasks.remove(position);
            entry.cancel.cancel();
            entry.record.status = DownloadStatus::Cancelled;
            entry.record.progress = 0;
            entry.record
        };

        inner.repository.upsert(&record).await?;
        info!("Download cancelled");
        inner.emit(DownloadEvent::Cancelled {
            song_id: song_id.to_string(),
        });
        Ok(true)
    }

    /// Cancel each id in turn; returns how many were in flight
    pub async fn cancel_many(&self, song_ids: &[String]) -> Result<usize> {
        let mut cancelled = 0;
        for song_id in song_ids {
            if self.cancel(song_id).await? {
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    /// Remove the record of `song_id`, aborting its transfer if one runs.
    ///
    /// Downloaded files are left on disk.
    pub async fn clear(&self, song_id: &str) -> Result<bool> {
        let inner = &self.inner;
        let _write = inner.write_lock.lock().await;

        let had_task = inner.drop_tasks(|id| id == song_id);
        let removed = inner.repository.delete(song_id).await?;
        if removed || had_task {
            inner.emit(DownloadEvent::Cleared {
                song_id: song_id.to_string(),
            });
        }
        Ok(removed || had_task)
    }

    /// Remove several records at once; returns the number of rows deleted
    pub async fn clear_many(&self, song_ids: &[String]) -> Result<u64> {
        if song_ids.is_empty() {
            return Ok(0);
        }
        let inner = &self.inner;
        let _write = inner.write_lock.lock().await;

        let wanted: HashSet<&str> = song_ids.iter().map(String::as_str).collect();
        inner.drop_tasks(|id| wanted.contains(id));
        let removed = inner.repository.delete_many(song_ids).await?;
        for song_id in song_ids {
            inner.emit(DownloadEvent::Cleared {
                song_id: song_id.clone(),
            });
        }
        Ok(removed)
    }

    // ========================================================================
    // Startup recovery
    // ========================================================================

    /// Mark records left `pending`/`downloading` by an earlier process as failed.
    ///
    /// Such transfers lost their cancellation handle with the process, so
    /// they are never resumed automatically. Returns the affected song ids.
    #[instrument(skip(self))]
    pub async fn recover_interrupted(&self) -> Result<Vec<String>> {
        let inner = &self.inner;
        let _write = inner.write_lock.lock().await;

        let live: HashSet<String> = inner
            .tasks
            .lock()
            .iter()
            .filter(|e| e.record.status.is_active())
            .map(|e| e.record.song_id.clone())
            .collect();

        let mut recovered = Vec::new();
        for status in [DownloadStatus::Pending, DownloadStatus::Downloading] {
            for mut record in inner.repository.list(Some(status)).await? {
                if live.contains(&record.song_id) {
                    continue;
                }
                record.status = DownloadStatus::Failed;
                record.progress = 0;
                record.error_message = Some(INTERRUPTED_MESSAGE.to_string());
                inner.repository.upsert(&record).await?;

                inner.emit(DownloadEvent::Failed {
                    song_id: record.song_id.clone(),
                    message: INTERRUPTED_MESSAGE.to_string(),
                });
                recovered.push(record.song_id);
            }
        }

        if !recovered.is_empty() {
            info!(count = recovered.len(), "Marked interrupted downloads as failed");
        }
        Ok(recovered)
    }
}

impl fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadManager")
            .field("config", &self.inner.config)
            .field("tasks", &self.inner.tasks.lock().len())
            .field("available_permits", &self.inner.permits.available_permits())
            .finish()
    }
}

fn cancelled(mut record: DownloadRecord) -> DownloadRecord {
    record.status = DownloadStatus::Cancelled;
    record.progress = 0;
    record
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl ManagerInner {
    fn emit(&self, event: DownloadEvent) {
        if let Some(events) = &self.events {
            let _ = events.emit(CoreEvent::Download(event));
        }
    }

    /// Store `record`; failures are logged and the task carries on
    async fn store(&self, record: &DownloadRecord) {
        if let Err(e) = self.repository.upsert(record).await {
            warn!(error = %e, song_id = %record.song_id, "Failed to persist download record");
        }
    }

    /// Remove matching in-memory tasks and abort their transfers
    fn drop_tasks(&self, matches: impl Fn(&str) -> bool) -> bool {
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|entry| {
            let keep = !matches(&entry.record.song_id);
            if !keep {
                entry.cancel.cancel();
            }
            keep
        });
        tasks.len() != before
    }

    /// Apply `change` to the live task and persist it.
    ///
    /// `change` returns whether it modified anything. `None` when the task
    /// is gone, belongs to a newer lifecycle or did not change.
    async fn transition<F>(&self, song_id: &str, generation: u64, change: F) -> Option<DownloadRecord>
    where
        F: FnOnce(&mut DownloadRecord) -> bool + Send,
    {
        let _write = self.write_lock.lock().await;
        let record = {
            let mut tasks = self.tasks.lock();
            let entry = tasks
                .iter_mut()
                .find(|e| e.record.song_id == song_id && e.generation == generation)?;
            if !change(&mut entry.record) {
                return None;
            }
            entry.record.clone()
        };
        self.store(&record).await;
        Some(record)
    }

    async fn enqueue(&self, track: &Track, path_hint: Option<&Path>) -> Enqueued {
        let _write = self.write_lock.lock().await;

        let (enqueued, to_store) = {
            let mut tasks = self.tasks.lock();
            let in_flight = tasks
                .iter()
                .position(|e| e.record.song_id == track.id && e.record.status.is_active());
            if let Some(position) = in_flight {
                let entry = &mut tasks[position];
                entry.record.title = track.title.clone();
                entry.record.album = track.album.clone();
                if let Some(size) = track.size {
                    entry.record.size = i64::try_from(size).unwrap_or(i64::MAX);
                }
                let record = entry.record.clone();
                (Enqueued::InFlight(record.clone()), record)
            } else {
                tasks.retain(|e| e.record.song_id != track.id);

                let mut record = DownloadRecord::pending(track);
                record.file_path = path_hint.map(path_string);
                let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
                let cancel = CancellationToken::new();
                tasks.push(TaskEntry {
                    record: record.clone(),
                    generation,
                    cancel: cancel.clone(),
                });
                (
                    Enqueued::Fresh {
                        record: record.clone(),
                        generation,
                        cancel,
                    },
                    record,
                )
            }
        };

        self.store(&to_store).await;
        if matches!(enqueued, Enqueued::Fresh { .. }) {
            info!(title = %track.title, "Download queued");
            self.emit(DownloadEvent::Queued {
                song_id: track.id.clone(),
                title: track.title.clone(),
            });
        }
        enqueued
    }

    /// Resolve the target, mark downloading and transfer.
    async fn run(
        &self,
        track: &Track,
        auth: &AuthContext,
        generation: u64,
        cancel: &CancellationToken,
        path_hint: Option<PathBuf>,
        last: &mut DownloadRecord,
    ) -> Result<PathBuf> {
        let hinted = match path_hint {
            Some(path) if self.reservations.reserve(&path) => Some(path),
            Some(path) => {
                warn!(
                    file = strip_path(&path.to_string_lossy()),
                    "Requested path is in use by another download, picking a new one"
                );
                None
            }
            None => None,
        };
        let target = match hinted {
            Some(path) => path,
            None => {
                let settings = DownloadSettings::load(self.settings.as_ref()).await;
                resolve_target_path(
                    track,
                    &settings,
                    self.file_system.as_ref(),
                    &self.reservations,
                    &self.config.file_extension,
                )
                .await?
            }
        };

        let result = self
            .transfer_to(track, auth, generation, cancel, &target, last)
            .await;
        self.reservations.release(&target);
        result.map(|_| target)
    }

    async fn transfer_to(
        &self,
        track: &Track,
        auth: &AuthContext,
        generation: u64,
        cancel: &CancellationToken,
        target: &Path,
        last: &mut DownloadRecord,
    ) -> Result<()> {
        let url = self
            .media_server
            .build_stream_url(auth, &track.id)
            .map_err(|e| DownloadError::Provider(e.to_string()))?;

        let file_path = path_string(target);
        let started = self
            .transition(&track.id, generation, |record| {
                record.status = DownloadStatus::Downloading;
                record.progress = 0;
                record.file_path = Some(file_path.clone());
                record.error_message = None;
                true
            })
            .await;
        match started {
            Some(record) => *last = record,
            // Cancelled or cleared while waiting for a slot.
            None => return Err(DownloadError::Cancelled),
        }
        self.emit(DownloadEvent::Started {
            song_id: track.id.clone(),
            file_path,
        });

        let request = TransferRequest {
            url,
            target: target.to_path_buf(),
            expected_size: track.size,
        };
        let progress = TaskProgress {
            inner: self,
            song_id: &track.id,
            generation,
        };
        self.transfer.transfer(&request, &progress, cancel).await?;
        Ok(())
    }

    async fn complete(&self, last: DownloadRecord, generation: u64, path: PathBuf) -> DownloadRecord {
        let file_path = path_string(&path);
        let song_id = last.song_id.clone();
        let stored = self
            .transition(&song_id, generation, |record| {
                record.status = DownloadStatus::Success;
                record.progress = 100;
                record.file_path = Some(file_path.clone());
                record.error_message = None;
                true
            })
            .await;

        // Cancel or clear got in after the last byte; its record stands.
        let Some(stored) = stored else {
            debug!(song_id = %song_id, "Finished transfer was already cancelled");
            return cancelled(last);
        };

        info!(song_id = %song_id, "Download completed");
        self.emit(DownloadEvent::Completed { song_id, file_path });
        stored
    }

    async fn fail(&self, last: DownloadRecord, generation: u64, error: &DownloadError) -> DownloadRecord {
        let message = error.to_string();
        let song_id = last.song_id.clone();

        let stored = self
            .transition(&song_id, generation, |record| {
                record.status = DownloadStatus::Failed;
                record.progress = 0;
                record.error_message = Some(message.clone());
                true
            })
            .await;

        let Some(stored) = stored else {
            debug!(song_id = %song_id, error = %message, "Failed transfer was already cancelled");
            return cancelled(last);
        };

        warn!(song_id = %song_id, error = %message, "Download failed");
        self.emit(DownloadEvent::Failed { song_id, message });
        stored
    }
}

/// Progress receiver bound to one task lifecycle.
struct TaskProgress<'a> {
    inner: &'a ManagerInner,
    song_id: &'a str,
    generation: u64,
}

#[async_trait]
impl ProgressSink for TaskProgress<'_> {
    async fn report(&self, percent: f64) {
        let Some(percent) = clamp_progress(percent) else {
            return;
        };
        let updated = self
            .inner
            .transition(self.song_id, self.generation, |record| {
                if record.status != DownloadStatus::Downloading || record.progress == percent {
                    return false;
                }
                record.progress = percent;
                true
            })
            .await;

        if updated.is_some() {
            self.inner.emit(DownloadEvent::Progress {
                song_id: self.song_id.to_string(),
                percent,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_progress() {
        assert_eq!(clamp_progress(-3.0), Some(0));
        assert_eq!(clamp_progress(42.4), Some(42));
        assert_eq!(clamp_progress(98.6), Some(99));
        assert_eq!(clamp_progress(100.0), Some(99));
        assert_eq!(clamp_progress(250.0), Some(99));
        assert_eq!(clamp_progress(f64::NAN), None);
        assert_eq!(clamp_progress(f64::INFINITY), None);
    }

    #[test]
    fn test_cancelled_resets_progress() {
        let mut record = DownloadRecord::pending(&Track::new("s1", "S", "A", "B"));
        record.status = DownloadStatus::Downloading;
        record.progress = 57;

        let record = cancelled(record);
        assert_eq!(record.status, DownloadStatus::Cancelled);
        assert_eq!(record.progress, 0);
    }
}
