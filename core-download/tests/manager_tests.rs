//! Download manager lifecycles against a real catalog database.

use async_trait::async_trait;
use bridge_desktop::{SqliteSettingsStore, TokioFileSystem};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::media::{AuthContext, MediaServerClient, Track};
use core_download::{
    DownloadConfig, DownloadError, DownloadManager, ProgressSink, TrackTransfer, TransferRequest,
    INTERRUPTED_MESSAGE,
};
use core_library::db::create_test_pool;
use core_library::models::{DownloadRecord, DownloadStatus};
use core_library::repositories::{DownloadRepository, SqliteDownloadRepository};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use core_runtime::settings::DownloadSettings;
use mockall::mock;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

mock! {
    MediaServer {}

    #[async_trait]
    impl MediaServerClient for MediaServer {
        async fn fetch_track_list(&self, auth: &AuthContext) -> BridgeResult<Vec<Track>>;
        fn build_stream_url(&self, auth: &AuthContext, track_id: &str) -> BridgeResult<String>;
        async fn fetch_track_by_id(&self, auth: &AuthContext, track_id: &str) -> BridgeResult<Track>;
    }
}

/// Reports fixed progress steps, optionally waits on a one-shot gate, then
/// writes a small file or fails.
#[derive(Default)]
struct ScriptedTransfer {
    steps: Vec<f64>,
    gate: Mutex<Option<Arc<Notify>>>,
    failure: Option<String>,
    /// Finish a gated transfer even after its token was cancelled
    ignore_cancel: bool,
    started: Notify,
    calls: AtomicUsize,
}

impl ScriptedTransfer {
    fn with_steps(steps: &[f64]) -> Self {
        Self {
            steps: steps.to_vec(),
            ..Default::default()
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    fn ignoring_cancel() -> Self {
        Self {
            ignore_cancel: true,
            ..Default::default()
        }
    }

    /// Hold the next transfer until the returned gate is notified
    fn gate_next(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrackTransfer for ScriptedTransfer {
    async fn transfer(
        &self,
        request: &TransferRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> core_download::Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        for step in &self.steps {
            progress.report(*step).await;
        }

        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            if self.ignore_cancel {
                gate.notified().await;
            } else {
                tokio::select! {
                    _ = gate.notified() => {}
                    _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                }
            }
        }

        if let Some(message) = &self.failure {
            return Err(DownloadError::Transfer(message.clone()));
        }
        std::fs::write(&request.target, b"audio").map_err(bridge_traits::error::BridgeError::from)?;
        Ok(5)
    }
}

struct Harness {
    dir: TempDir,
    manager: DownloadManager,
    repository: Arc<SqliteDownloadRepository>,
    transfer: Arc<ScriptedTransfer>,
    events: EventBus,
}

impl Harness {
    async fn new(transfer: ScriptedTransfer, max_concurrent: usize) -> Self {
        Self::with_music_dir(transfer, max_concurrent, true).await
    }

    async fn with_music_dir(transfer: ScriptedTransfer, max_concurrent: usize, configured: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repository = Arc::new(SqliteDownloadRepository::new(create_test_pool().await.unwrap()));
        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        if configured {
            DownloadSettings {
                music_dir: dir.path().to_string_lossy().into_owned(),
                organize_by_album: false,
                ..Default::default()
            }
            .save(settings.as_ref())
            .await
            .unwrap();
        }

        let mut media = MockMediaServer::new();
        media
            .expect_build_stream_url()
            .returning(|_, id| Ok(format!("https://music.example.com/rest/stream?id={}", id)));

        let transfer = Arc::new(transfer);
        let events = EventBus::new(256);
        let config = DownloadConfig::builder()
            .max_concurrent_downloads(max_concurrent)
            .build()
            .unwrap();
        let manager = DownloadManager::new(
            repository.clone(),
            settings,
            Arc::new(TokioFileSystem::new()),
            Arc::new(media),
            transfer.clone(),
            config,
        )
        .unwrap()
        .with_event_bus(events.clone());

        Self {
            dir,
            manager,
            repository,
            transfer,
            events,
        }
    }

    async fn stored(&self, song_id: &str) -> DownloadRecord {
        self.repository.find_by_id(song_id).await.unwrap().unwrap()
    }
}

fn track(id: &str, title: &str) -> Track {
    Track::new(id, title, "Artist", "Album").with_size(5)
}

fn auth() -> AuthContext {
    AuthContext::new("https://music.example.com").with_bearer_token("jwt")
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<CoreEvent>) -> Vec<DownloadEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let CoreEvent::Download(event) = event {
            events.push(event);
        }
    }
    events
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition never became true");
}

// ============================================================================
// Lifecycles
// ============================================================================

#[tokio::test]
async fn test_successful_download() {
    let h = Harness::new(ScriptedTransfer::with_steps(&[0.4, 12.6, 12.9, 150.0]), 3).await;
    let mut rx = h.events.subscribe();

    let record = h.manager.start(track("s1", "Song: One"), auth(), None).await;

    let expected_path = h.dir.path().join("Song_ One.mp3");
    assert_eq!(record.status, DownloadStatus::Success);
    assert_eq!(record.progress, 100);
    assert_eq!(record.file_path.as_deref(), Some(expected_path.to_str().unwrap()));
    assert!(expected_path.exists());
    assert_eq!(h.stored("s1").await, record);

    let events = drain(&mut rx);
    let progress: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            DownloadEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![13, 99], "clamped and deduplicated");
    assert!(matches!(events.first(), Some(DownloadEvent::Queued { .. })));
    assert!(matches!(events.last(), Some(DownloadEvent::Completed { .. })));
}

#[tokio::test]
async fn test_missing_music_dir_records_failure() {
    let h = Harness::with_music_dir(ScriptedTransfer::default(), 3, false).await;

    let record = h.manager.start(track("s1", "Song"), auth(), None).await;

    assert_eq!(record.status, DownloadStatus::Failed);
    assert_eq!(record.progress, 0);
    assert!(record.error_message.unwrap().contains("not configured"));
    assert_eq!(h.stored("s1").await.status, DownloadStatus::Failed);
    assert_eq!(h.transfer.calls(), 0);
}

#[tokio::test]
async fn test_transfer_failure_is_recorded_not_thrown() {
    let h = Harness::new(ScriptedTransfer::failing("connection reset"), 3).await;

    let record = h.manager.start(track("s1", "Song"), auth(), None).await;

    assert_eq!(record.status, DownloadStatus::Failed);
    assert_eq!(record.progress, 0);
    let stored = h.stored("s1").await;
    assert!(stored.error_message.unwrap().contains("connection reset"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_then_restart() {
    let h = Harness::new(ScriptedTransfer::with_steps(&[40.0]), 3).await;
    let _gate = h.transfer.gate_next();

    let running = h.manager.spawn(track("s1", "Song"), auth(), None);
    h.transfer.started.notified().await;
    wait_until(|| h.manager.task("s1").map(|r| r.progress) == Some(40)).await;

    assert!(h.manager.cancel("s1").await.unwrap());
    let stored = h.stored("s1").await;
    assert_eq!(stored.status, DownloadStatus::Cancelled);
    assert_eq!(stored.progress, 0);
    assert!(h.manager.task("s1").is_none());

    let cancelled = running.await.unwrap();
    assert_eq!(cancelled.status, DownloadStatus::Cancelled);
    // The stale task never overwrote the cancellation.
    assert_eq!(h.stored("s1").await.status, DownloadStatus::Cancelled);

    let restarted = h.manager.start(track("s1", "Song"), auth(), None).await;
    assert_eq!(restarted.status, DownloadStatus::Success);
    assert_eq!(h.stored("s1").await.status, DownloadStatus::Success);
    assert_eq!(h.transfer.calls(), 2);
}

#[tokio::test]
async fn test_cancel_unknown_task() {
    let h = Harness::new(ScriptedTransfer::default(), 3).await;
    assert!(!h.manager.cancel("nope").await.unwrap());
    assert_eq!(h.manager.cancel_many(&["a".into(), "b".into()]).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplicate_start_reuses_in_flight_task() {
    let h = Harness::new(ScriptedTransfer::default(), 3).await;
    let gate = h.transfer.gate_next();

    let running = h.manager.spawn(track("s1", "Song"), auth(), None);
    h.transfer.started.notified().await;

    let duplicate = h
        .manager
        .start(track("s1", "Song (Remastered)"), auth(), None)
        .await;
    assert_eq!(duplicate.status, DownloadStatus::Downloading);
    assert_eq!(duplicate.title, "Song (Remastered)");

    gate.notify_one();
    let finished = running.await.unwrap();
    assert_eq!(finished.status, DownloadStatus::Success);
    assert_eq!(h.transfer.calls(), 1);
    assert_eq!(h.manager.tasks().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrency_limit_keeps_tasks_pending() {
    let h = Harness::new(ScriptedTransfer::default(), 1).await;
    let gate = h.transfer.gate_next();

    let first = h.manager.spawn(track("a", "First"), auth(), None);
    h.transfer.started.notified().await;
    let second = h.manager.spawn(track("b", "Second"), auth(), None);
    wait_until(|| h.manager.task("b").is_some()).await;

    assert_eq!(h.manager.task("b").unwrap().status, DownloadStatus::Pending);
    assert_eq!(h.manager.active_count(), 2);
    assert_eq!(h.transfer.calls(), 1);

    gate.notify_one();
    assert_eq!(first.await.unwrap().status, DownloadStatus::Success);
    assert_eq!(second.await.unwrap().status, DownloadStatus::Success);
    assert_eq!(h.manager.active_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_while_pending() {
    let h = Harness::new(ScriptedTransfer::default(), 1).await;
    let gate = h.transfer.gate_next();

    let first = h.manager.spawn(track("a", "First"), auth(), None);
    h.transfer.started.notified().await;
    let second = h.manager.spawn(track("b", "Second"), auth(), None);
    wait_until(|| h.manager.task("b").is_some()).await;

    assert!(h.manager.cancel("b").await.unwrap());
    assert_eq!(second.await.unwrap().status, DownloadStatus::Cancelled);

    gate.notify_one();
    first.await.unwrap();
    assert_eq!(h.transfer.calls(), 1);
    assert_eq!(h.stored("b").await.status, DownloadStatus::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parallel_same_title_gets_distinct_paths() {
    let h = Harness::new(ScriptedTransfer::default(), 2).await;
    let gate = h.transfer.gate_next();

    let first = h.manager.spawn(track("a", "Intro"), auth(), None);
    h.transfer.started.notified().await;
    let second = h.manager.start(track("b", "Intro"), auth(), None).await;
    gate.notify_one();
    let first = first.await.unwrap();

    assert_eq!(first.file_path.unwrap(), h.dir.path().join("Intro.mp3").to_string_lossy());
    assert_eq!(second.file_path.unwrap(), h.dir.path().join("Intro (2).mp3").to_string_lossy());
}

// ============================================================================
// Records
// ============================================================================

#[tokio::test]
async fn test_recover_interrupted_marks_failed() {
    let h = Harness::new(ScriptedTransfer::default(), 3).await;
    for (id, status) in [
        ("p", DownloadStatus::Pending),
        ("d", DownloadStatus::Downloading),
        ("c", DownloadStatus::Cancelled),
    ] {
        let mut record = DownloadRecord::pending(&track(id, id));
        record.status = status;
        record.progress = if status == DownloadStatus::Downloading { 63 } else { 0 };
        h.repository.upsert(&record).await.unwrap();
    }

    let mut recovered = h.manager.recover_interrupted().await.unwrap();
    recovered.sort();
    assert_eq!(recovered, vec!["d", "p"]);

    for id in ["p", "d"] {
        let stored = h.stored(id).await;
        assert_eq!(stored.status, DownloadStatus::Failed);
        assert_eq!(stored.progress, 0);
        assert_eq!(stored.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
    }
    assert_eq!(h.stored("c").await.status, DownloadStatus::Cancelled);
}

#[tokio::test]
async fn test_retry_reuses_recorded_path() {
    let h = Harness::new(ScriptedTransfer::default(), 3).await;
    let path = h.dir.path().join("custom.mp3");
    let mut record = DownloadRecord::pending(&track("s1", "Song"));
    record.status = DownloadStatus::Failed;
    record.file_path = Some(path.to_string_lossy().into_owned());
    record.error_message = Some(INTERRUPTED_MESSAGE.into());
    h.repository.upsert(&record).await.unwrap();

    let retried = h.manager.retry("s1", auth()).await.unwrap();

    assert_eq!(retried.status, DownloadStatus::Success);
    assert_eq!(retried.error_message, None);
    assert_eq!(retried.file_path.map(PathBuf::from), Some(path.clone()));
    assert!(path.exists());

    let err = h.manager.retry("missing", auth()).await.unwrap_err();
    assert!(matches!(err, DownloadError::TaskNotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_path_hint_in_use_falls_back_to_free_path() {
    let h = Harness::new(ScriptedTransfer::default(), 3).await;
    let hint = h.dir.path().join("shared.mp3");
    let gate = h.transfer.gate_next();

    let running = h.manager.spawn(track("s1", "Song"), auth(), Some(hint.clone()));
    h.transfer.started.notified().await;

    let second = h.manager.start(track("s2", "Other"), auth(), Some(hint.clone())).await;
    assert_eq!(second.status, DownloadStatus::Success);
    assert_eq!(
        second.file_path.map(PathBuf::from),
        Some(h.dir.path().join("Other.mp3"))
    );

    gate.notify_one();
    let first = running.await.unwrap();
    assert_eq!(first.status, DownloadStatus::Success);
    assert_eq!(first.file_path.map(PathBuf::from), Some(hint));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_after_last_byte_keeps_cancellation() {
    let h = Harness::new(ScriptedTransfer::ignoring_cancel(), 3).await;
    let gate = h.transfer.gate_next();
    let mut rx = h.events.subscribe();

    let running = h.manager.spawn(track("s1", "Song"), auth(), None);
    h.transfer.started.notified().await;
    assert!(h.manager.cancel("s1").await.unwrap());
    gate.notify_one();

    let record = running.await.unwrap();
    assert_eq!(record.status, DownloadStatus::Cancelled);
    assert_eq!(record.progress, 0);
    assert_eq!(h.stored("s1").await.status, DownloadStatus::Cancelled);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, DownloadEvent::Cancelled { .. })));
    assert!(!events.iter().any(|e| matches!(e, DownloadEvent::Completed { .. })));
}

#[tokio::test]
async fn test_clear_keeps_file() {
    let h = Harness::new(ScriptedTransfer::default(), 3).await;
    let done = h.manager.start(track("s1", "Song"), auth(), None).await;
    h.manager.start(track("s2", "Other"), auth(), None).await;

    assert!(h.manager.clear("s1").await.unwrap());
    assert!(h.repository.find_by_id("s1").await.unwrap().is_none());
    assert!(PathBuf::from(done.file_path.unwrap()).exists());
    assert!(!h.manager.clear("s1").await.unwrap());

    assert_eq!(h.manager.clear_many(&["s2".into()]).await.unwrap(), 1);
    assert!(h.manager.tasks().is_empty());
    assert!(h.manager.list_records(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_downloaded_checks() {
    let h = Harness::new(ScriptedTransfer::default(), 3).await;
    h.manager.start(track("s1", "Song"), auth(), None).await;

    assert!(h.manager.is_downloaded("s1").await.unwrap());
    assert!(!h.manager.is_downloaded("s2").await.unwrap());

    let remaining = h
        .manager
        .filter_undownloaded(vec![track("s1", "Song"), track("s2", "Other")])
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "s2");
}
