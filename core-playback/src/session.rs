//! # Session Controller
//!
//! Owns the playback queue and serialises play requests.
//!
//! Every play request stamps a new session id from a monotonic counter, stops
//! whatever is audible and resolves its source asynchronously. The resolution
//! comes back tagged with that id and is committed through a single guarded
//! step: if a newer request has been issued in the meantime, the result is
//! dropped without touching state, the output or the event bus.
//!
//! Superseded resolutions are not cancelled; their I/O runs to completion in
//! the background and is then discarded.

use crate::error::PlaybackError;
use crate::output::AudioOutput;
use crate::resolver::TrackResolver;
use crate::sequencing::{self, EndAction, PlayMode, ShuffleHistory};
use crate::snapshot::{clamp_unit, PlaybackSnapshot, SnapshotStore};
use crate::source::{PlayableSource, SourceKind};
use bridge_traits::media::{AuthContext, MediaServerClient, Track};
use bridge_traits::time::Clock;
use core_library::PlayHistory;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Public views
// ============================================================================

/// Read-only copy of the session state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackView {
    /// Stamp of the most recent play request
    pub session_id: u64,
    pub queue: Vec<Track>,
    /// `-1` when nothing is selected
    pub current_index: i64,
    pub current_track: Option<Track>,
    pub mode: PlayMode,
    pub volume: f64,
    /// Seconds
    pub progress: f64,
    /// Seconds, 0 when unknown
    pub duration: f64,
    pub is_playing: bool,
    pub is_loading: bool,
    pub error: Option<String>,
    pub source: Option<SourceKind>,
}

/// What a play request ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    /// The resolved source was loaded (and started, unless restoring)
    Committed { session_id: u64, source: SourceKind },
    /// Resolution or output failed; the message is in the session error
    Failed { session_id: u64, message: String },
    /// A newer request took over before this one resolved
    Superseded { session_id: u64 },
    /// Playback was paused instead of started
    Paused,
    /// Nothing to do (empty queue, no credentials, end of an ordered queue)
    Skipped,
}

impl PlayOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, PlayOutcome::Committed { .. })
    }
}

// ============================================================================
// Internal state
// ============================================================================

struct SessionState {
    queue: Vec<Track>,
    current_index: Option<usize>,
    mode: PlayMode,
    volume: f64,
    progress: f64,
    duration: f64,
    is_playing: bool,
    is_loading: bool,
    error: Option<String>,
    source: Option<PlayableSource>,
    auth: Option<AuthContext>,
    shuffle_history: ShuffleHistory,
    rng: StdRng,
}

impl SessionState {
    fn new() -> Self {
        Self {
            queue: Vec::new(),
            current_index: None,
            mode: PlayMode::List,
            volume: crate::snapshot::DEFAULT_VOLUME,
            progress: 0.0,
            duration: 0.0,
            is_playing: false,
            is_loading: false,
            error: None,
            source: None,
            auth: None,
            shuffle_history: ShuffleHistory::new(),
            rng: StdRng::from_entropy(),
        }
    }

    fn current_track(&self) -> Option<&Track> {
        self.current_index.and_then(|i| self.queue.get(i))
    }

    fn current_index_signed(&self) -> i64 {
        self.current_index.map_or(-1, |i| i as i64)
    }

    /// Keep the index valid after the queue changed
    fn normalise_index(&mut self) {
        self.current_index = match self.current_index {
            _ if self.queue.is_empty() => None,
            Some(i) if i >= self.queue.len() => Some(self.queue.len() - 1),
            other => other,
        };
    }
}

/// A play request in flight.
struct Attempt {
    session_id: u64,
    track: Track,
    auth: AuthContext,
}

/// A resolution tagged with the request that produced it.
struct Resolution {
    session_id: u64,
    track: Track,
    outcome: crate::Result<PlayableSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitMode {
    /// Load and start
    Play,
    /// Load only; failures are logged, not shown
    Restore,
}

// ============================================================================
// Controller
// ============================================================================

/// Single owner of the playback session.
pub struct SessionController {
    session_counter: AtomicU64,
    state: Mutex<SessionState>,
    resolver: Arc<dyn TrackResolver>,
    output: Arc<dyn AudioOutput>,
    snapshots: SnapshotStore,
    media_server: Arc<dyn MediaServerClient>,
    history: Option<Arc<PlayHistory>>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl SessionController {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        output: Arc<dyn AudioOutput>,
        snapshots: SnapshotStore,
        media_server: Arc<dyn MediaServerClient>,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            session_counter: AtomicU64::new(0),
            state: Mutex::new(SessionState::new()),
            resolver,
            output,
            snapshots,
            media_server,
            history: None,
            clock,
            events,
        }
    }

    /// Record committed plays in the recently-played list
    pub fn with_play_history(mut self, history: Arc<PlayHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Deterministic shuffle order
    pub fn with_rng_seed(self, seed: u64) -> Self {
        self.state.lock().rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn current_session_id(&self) -> u64 {
        self.session_counter.load(Ordering::SeqCst)
    }

    pub fn view(&self) -> PlaybackView {
        let state = self.state.lock();
        PlaybackView {
            session_id: self.current_session_id(),
            queue: state.queue.clone(),
            current_index: state.current_index_signed(),
            current_track: state.current_track().cloned(),
            mode: state.mode,
            volume: state.volume,
            progress: state.progress,
            duration: state.duration,
            is_playing: state.is_playing,
            is_loading: state.is_loading,
            error: state.error.clone(),
            source: state.source.as_ref().map(|s| s.kind),
        }
    }

    // ========================================================================
    // Play flow
    // ========================================================================

    /// Stamp a new session for the current track and silence the output.
    ///
    /// Must be called with the state lock held so the stamp and the state
    /// change are one step.
    fn begin_attempt(&self, state: &mut SessionState) -> Option<Attempt> {
        let track = state.current_track()?.clone();
        let auth = state.auth.clone()?;

        let session_id = self.session_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.output.pause();
        state.is_playing = false;
        state.is_loading = true;
        state.error = None;

        Some(Attempt {
            session_id,
            track,
            auth,
        })
    }

    async fn play_current(&self) -> PlayOutcome {
        let attempt = {
            let mut state = self.state.lock();
            self.begin_attempt(&mut state)
        };
        match attempt {
            Some(attempt) => self.run_attempt(attempt, CommitMode::Play).await,
            None => PlayOutcome::Skipped,
        }
    }

    async fn run_attempt(&self, attempt: Attempt, mode: CommitMode) -> PlayOutcome {
        let Attempt {
            session_id,
            track,
            auth,
        } = attempt;

        self.emit(PlaybackEvent::Loading {
            session_id,
            track_id: track.id.clone(),
        });

        let outcome = self.resolver.resolve(&track, &auth).await;
        let resolution = Resolution {
            session_id,
            track,
            outcome,
        };
        let track = resolution.track.clone();
        let result = self.commit(resolution, mode);

        match (&result, mode) {
            (PlayOutcome::Committed { source, .. }, CommitMode::Play) => {
                info!(session_id, track_id = %track.id, source = %source, "Playback started");
                self.emit(PlaybackEvent::Started {
                    session_id,
                    track_id: track.id.clone(),
                    title: track.title.clone(),
                    source: source.to_string(),
                });
                self.record_recent_play(&track).await;
                self.persist_snapshot().await;
            }
            (PlayOutcome::Failed { message, .. }, CommitMode::Play) => {
                warn!(session_id, track_id = %track.id, error = %message, "Playback failed");
                self.emit(PlaybackEvent::Error {
                    session_id,
                    track_id: Some(track.id.clone()),
                    message: message.clone(),
                });
            }
            (PlayOutcome::Superseded { .. }, _) => {
                debug!(session_id, track_id = %track.id, "Discarding superseded resolution");
            }
            _ => {}
        }

        result
    }

    /// The one place a resolution mutates the session.
    fn commit(&self, resolution: Resolution, mode: CommitMode) -> PlayOutcome {
        let mut state = self.state.lock();
        let session_id = resolution.session_id;
        if self.session_counter.load(Ordering::SeqCst) != session_id {
            return PlayOutcome::Superseded { session_id };
        }

        let loaded = resolution.outcome.and_then(|source| {
            // Reloading the same source would restart it from the beginning.
            if state.source.as_ref() != Some(&source) {
                self.output.load(&source)?;
            }
            if mode == CommitMode::Play {
                self.output.play()?;
            }
            Ok(source)
        });

        state.is_loading = false;
        match loaded {
            Ok(source) => {
                if state.source.as_ref() != Some(&source) {
                    state.progress = 0.0;
                    state.duration = resolution.track.duration.max(0.0);
                }
                let kind = source.kind;
                state.source = Some(source);
                state.is_playing = mode == CommitMode::Play;
                state.error = None;
                PlayOutcome::Committed {
                    session_id,
                    source: kind,
                }
            }
            Err(e) => {
                let message = describe(&e);
                state.is_playing = false;
                if mode == CommitMode::Play {
                    state.error = Some(message.clone());
                }
                PlayOutcome::Failed {
                    session_id,
                    message,
                }
            }
        }
    }

    async fn record_recent_play(&self, track: &Track) {
        if let Some(history) = &self.history {
            if let Err(e) = history.record(track).await {
                warn!(error = %e, "Failed to record recent play");
            }
        }
    }

    /// Write mode, volume and the current snapshot; failures are logged.
    async fn persist_snapshot(&self) {
        let (snapshot, mode, volume) = {
            let state = self.state.lock();
            let snapshot = state.current_track().map(|track| PlaybackSnapshot {
                track_id: track.id.clone(),
                mode: state.mode,
                volume: state.volume,
                updated_at: self.clock.unix_timestamp_millis(),
            });
            (snapshot, state.mode, state.volume)
        };

        if let Err(e) = self.snapshots.save_mode(mode).await {
            warn!(error = %e, "Failed to save play mode");
        }
        if let Err(e) = self.snapshots.save_volume(volume).await {
            warn!(error = %e, "Failed to save volume");
        }
        if let Err(e) = self.snapshots.save(snapshot.as_ref()).await {
            warn!(error = %e, "Failed to write playback snapshot");
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is fine.
        let _ = self.events.emit(CoreEvent::Playback(event));
    }

    fn emit_queue_changed(&self) {
        let (length, current_index) = {
            let state = self.state.lock();
            (state.queue.len(), state.current_index_signed())
        };
        self.emit(PlaybackEvent::QueueChanged {
            length,
            current_index,
        });
    }

    // ========================================================================
    // Queue operations
    // ========================================================================

    /// Replace the queue with `list` and play `target_id` (or the first track).
    #[instrument(skip(self, list, auth), fields(len = list.len()))]
    pub async fn play_from_list(
        &self,
        list: Vec<Track>,
        target_id: &str,
        auth: AuthContext,
    ) -> PlayOutcome {
        {
            let mut state = self.state.lock();
            let index = list.iter().position(|t| t.id == target_id).unwrap_or(0);
            state.current_index = (!list.is_empty()).then_some(index);
            state.queue = list;
            state.shuffle_history.clear();
            state.auth = Some(auth);
        }
        self.emit_queue_changed();
        self.play_current().await
    }

    /// Insert `track` right after the current one.
    ///
    /// An existing copy is moved rather than duplicated. With an empty queue
    /// the track plays immediately.
    pub async fn queue_next(&self, track: Track, auth: AuthContext) -> PlayOutcome {
        let play_now = {
            let mut state = self.state.lock();
            state.auth = Some(auth);

            if state.queue.is_empty() {
                state.queue = vec![track];
                state.current_index = Some(0);
                true
            } else {
                if let Some(existing) = state.queue.iter().position(|t| t.id == track.id) {
                    state.queue.remove(existing);
                    if let Some(current) = state.current_index {
                        if existing <= current && current > 0 {
                            state.current_index = Some(current - 1);
                        }
                    }
                }
                let insert_at = state
                    .current_index
                    .map_or(0, |c| c + 1)
                    .min(state.queue.len());
                state.queue.insert(insert_at, track);
                state.normalise_index();
                false
            }
        };

        self.emit_queue_changed();
        if play_now {
            self.play_current().await
        } else {
            PlayOutcome::Skipped
        }
    }

    /// Jump to `song_id` within the current queue.
    pub async fn play_song_by_id(&self, song_id: &str) -> PlayOutcome {
        {
            let mut state = self.state.lock();
            if state.auth.is_none() {
                return PlayOutcome::Skipped;
            }
            let Some(index) = state.queue.iter().position(|t| t.id == song_id) else {
                return PlayOutcome::Skipped;
            };
            if state.mode == PlayMode::Shuffle {
                if let Some(current) = state.current_index.filter(|&c| c != index) {
                    state.shuffle_history.push(current);
                }
            }
            state.current_index = Some(index);
        }
        self.play_current().await
    }

    /// Stop, empty the queue and clear the stored snapshot.
    ///
    /// Also invalidates any resolution still in flight.
    pub async fn clear_queue(&self) {
        let previous = {
            let mut state = self.state.lock();
            self.session_counter.fetch_add(1, Ordering::SeqCst);
            self.output.stop();
            let previous = state.current_track().map(|t| t.id.clone());

            state.queue.clear();
            state.current_index = None;
            state.is_playing = false;
            state.is_loading = false;
            state.progress = 0.0;
            state.duration = 0.0;
            state.error = None;
            state.source = None;
            state.shuffle_history.clear();
            previous
        };

        self.emit(PlaybackEvent::Stopped { track_id: previous });
        self.emit_queue_changed();

        if let Err(e) = self.snapshots.save(None).await {
            warn!(error = %e, "Failed to clear playback snapshot");
        }
    }

    // ========================================================================
    // Transport controls
    // ========================================================================

    /// Pause when playing; otherwise (re)start the current track.
    pub async fn toggle_play(&self) -> PlayOutcome {
        let paused_track = {
            let mut state = self.state.lock();
            let Some(track_id) = state.current_track().map(|t| t.id.clone()) else {
                return PlayOutcome::Skipped;
            };
            if state.is_playing {
                self.output.pause();
                state.is_playing = false;
                Some(track_id)
            } else {
                None
            }
        };

        if let Some(track_id) = paused_track {
            self.emit(PlaybackEvent::Paused { track_id });
            return PlayOutcome::Paused;
        }

        let outcome = self.play_current().await;
        if outcome.is_committed() {
            if let Some(track) = self.view().current_track {
                self.emit(PlaybackEvent::Resumed { track_id: track.id });
            }
        }
        outcome
    }

    pub async fn play_next(&self) -> PlayOutcome {
        {
            let mut state = self.state.lock();
            let state = &mut *state;
            let next = sequencing::next_index(
                state.mode,
                state.queue.len(),
                state.current_index,
                &mut state.shuffle_history,
                &mut state.rng,
            );
            match next {
                Some(index) => state.current_index = Some(index),
                None => return PlayOutcome::Skipped,
            }
        }
        self.play_current().await
    }

    pub async fn play_prev(&self) -> PlayOutcome {
        {
            let mut state = self.state.lock();
            let state = &mut *state;
            let previous = sequencing::previous_index(
                state.mode,
                state.queue.len(),
                state.current_index,
                &mut state.shuffle_history,
            );
            match previous {
                Some(index) => state.current_index = Some(index),
                None => return PlayOutcome::Skipped,
            }
        }
        self.play_current().await
    }

    /// The output reports that the current track finished.
    pub async fn handle_ended(&self) -> PlayOutcome {
        let (track_id, action) = {
            let state = self.state.lock();
            let Some(track) = state.current_track() else {
                return PlayOutcome::Skipped;
            };
            (
                track.id.clone(),
                sequencing::on_track_end(state.mode, state.queue.len(), state.current_index),
            )
        };

        self.emit(PlaybackEvent::Completed {
            track_id: track_id.clone(),
        });

        match action {
            EndAction::Replay => {
                self.rewind();
                self.play_current().await
            }
            EndAction::Advance => self.play_next().await,
            EndAction::Stop => {
                self.state.lock().is_playing = false;
                self.emit(PlaybackEvent::Stopped {
                    track_id: Some(track_id),
                });
                PlayOutcome::Skipped
            }
        }
    }

    fn rewind(&self) {
        let mut state = self.state.lock();
        self.output.seek(0.0);
        state.progress = 0.0;
    }

    /// Seek to `percent` of the track; no-op while the duration is unknown.
    ///
    /// Returns whether a seek happened.
    pub fn seek(&self, percent: f64) -> bool {
        let mut state = self.state.lock();
        if !(state.duration.is_finite() && state.duration > 0.0) {
            return false;
        }
        let position = clamp_unit(percent) * state.duration;
        self.output.seek(position);
        state.progress = position;
        true
    }

    /// Position report from the output
    pub fn update_progress(&self, position: f64, duration: f64) {
        let mut state = self.state.lock();
        state.progress = if position.is_finite() { position.max(0.0) } else { 0.0 };
        state.duration = if duration.is_finite() && duration > 0.0 {
            duration
        } else {
            0.0
        };
    }

    // ========================================================================
    // Preferences
    // ========================================================================

    /// Apply `volume` (clamped to `[0, 1]`) now, then persist it.
    pub async fn set_volume(&self, volume: f64) {
        let volume = clamp_unit(volume);
        self.state.lock().volume = volume;
        self.output.set_volume(volume);
        self.emit(PlaybackEvent::VolumeChanged { volume });
        self.persist_snapshot().await;
    }

    pub async fn set_mode(&self, mode: PlayMode) {
        self.state.lock().mode = mode;
        self.emit(PlaybackEvent::ModeChanged {
            mode: mode.to_string(),
        });
        self.persist_snapshot().await;
    }

    /// Advance to the next mode in the cycle and return it
    pub async fn cycle_mode(&self) -> PlayMode {
        let mode = self.state.lock().mode.cycle();
        self.set_mode(mode).await;
        mode
    }

    /// Restore volume and mode saved by a previous run
    pub async fn load_preferences(&self) {
        let prefs = self.snapshots.load_preferences().await;
        {
            let mut state = self.state.lock();
            state.volume = prefs.volume;
            state.mode = prefs.mode;
        }
        self.output.set_volume(prefs.volume);
        debug!(volume = prefs.volume, mode = %prefs.mode, "Loaded player preferences");
    }

    /// Rebuild the session from the stored snapshot without starting audio.
    ///
    /// The queue becomes the single snapshot track. Nothing is cleared when
    /// any step fails.
    #[instrument(skip(self, auth))]
    pub async fn restore_from_snapshot(&self, auth: AuthContext) -> PlayOutcome {
        let fallback_volume = self.state.lock().volume;
        let snapshot = match self.snapshots.load(fallback_volume).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return PlayOutcome::Skipped,
            Err(e) => {
                warn!(error = %e, "Failed to read playback snapshot");
                return PlayOutcome::Skipped;
            }
        };

        let track = match self
            .media_server
            .fetch_track_by_id(&auth, &snapshot.track_id)
            .await
        {
            Ok(track) => track,
            Err(e) => {
                warn!(error = %e, track_id = %snapshot.track_id, "Failed to fetch snapshot track");
                return PlayOutcome::Skipped;
            }
        };

        let attempt = {
            let mut state = self.state.lock();
            state.auth = Some(auth);
            state.queue = vec![track];
            state.current_index = Some(0);
            state.shuffle_history.clear();
            state.mode = snapshot.mode;
            state.volume = snapshot.volume;
            state.progress = 0.0;
            state.duration = 0.0;
            self.output.set_volume(snapshot.volume);
            self.begin_attempt(&mut state)
        };
        self.emit_queue_changed();

        let Some(attempt) = attempt else {
            return PlayOutcome::Skipped;
        };
        let outcome = self.run_attempt(attempt, CommitMode::Restore).await;

        match &outcome {
            PlayOutcome::Committed { .. } => {
                self.emit(PlaybackEvent::Restored {
                    track_id: snapshot.track_id.clone(),
                    mode: snapshot.mode.to_string(),
                });
                if let Err(e) = self.snapshots.save(Some(&snapshot)).await {
                    warn!(error = %e, "Failed to write back playback snapshot");
                }
                if let Err(e) = self.snapshots.save_mode(snapshot.mode).await {
                    warn!(error = %e, "Failed to save play mode");
                }
                if let Err(e) = self.snapshots.save_volume(snapshot.volume).await {
                    warn!(error = %e, "Failed to save volume");
                }
            }
            PlayOutcome::Failed { message, .. } => {
                warn!(error = %message, "Failed to load restored track");
            }
            _ => {}
        }

        outcome
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SessionController")
            .field("session_id", &self.current_session_id())
            .field("queue_len", &state.queue.len())
            .field("current_index", &state.current_index)
            .field("mode", &state.mode)
            .field("is_playing", &state.is_playing)
            .finish()
    }
}

fn describe(error: &PlaybackError) -> String {
    format!("Playback failed: {}", error)
}
