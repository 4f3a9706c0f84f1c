//! # Event Bus System
//!
//! Typed notifications between the player core and its hosts, carried over
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: one enum per domain ([`PlaybackEvent`], [`DownloadEvent`],
//!   [`LibraryEvent`]) wrapped by [`CoreEvent`]
//! - **EventBus**: cloneable publisher handle shared by all services
//! - **EventStream**: receiver wrapper with an optional predicate
//!
//! Services emit after a mutation has been committed (state updated, record
//! persisted), never before. Subscribers receive events in emission order for
//! a single publisher; no ordering is promised across subscribers.
//!
//! ```text
//! ┌──────────────────┐  emit   ┌──────────┐  subscribe  ┌────────────┐
//! │ SessionController├────────>│          ├────────────>│ UI / host  │
//! └──────────────────┘         │ EventBus │             └────────────┘
//! ┌──────────────────┐  emit   │          │  subscribe  ┌────────────┐
//! │ DownloadManager  ├────────>│          ├────────────>│ Library UI │
//! └──────────────────┘         └──────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, DownloadEvent, EventBus, EventStream};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut downloads = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Download(_)));
//!
//! bus.emit(CoreEvent::Download(DownloadEvent::Cancelled {
//!     song_id: "s1".to_string(),
//! }))
//! .ok();
//!
//! let event = downloads.recv().await.unwrap();
//! assert_eq!(event.description(), "Download cancelled");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell `n` events behind. Non-fatal;
//!   re-read state from the owning service if exactness matters.
//! - **`RecvError::Closed`**: every publisher has been dropped (shutdown).
//!
//! `emit` fails only when nobody is subscribed. Publishers ignore that error.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Download progress is the chattiest producer; 100 covers a few concurrent
/// transfers between UI frames.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the [`EventBus`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Playback(PlaybackEvent),
    Download(DownloadEvent),
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Short human-readable description
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Download(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Download(DownloadEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Download(DownloadEvent::Cancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::Started { .. }) => EventSeverity::Info,
            CoreEvent::Download(DownloadEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Library(LibraryEvent::LocalSongAdded { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Playback Events
// ============================================================================

/// Committed transitions of the playback session.
///
/// `session_id` is the stamp of the play request that produced the event;
/// superseded requests never emit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// A play request was accepted and source resolution began
    Loading { session_id: u64, track_id: String },
    /// The resolved source is playing
    Started {
        session_id: u64,
        track_id: String,
        title: String,
        /// One of `local`, `downloaded`, `cached`, `online`
        source: String,
    },
    /// A snapshot was restored and its source loaded without playing
    Restored { track_id: String, mode: String },
    Paused { track_id: String },
    Resumed { track_id: String },
    Stopped { track_id: Option<String> },
    /// The track ended naturally
    Completed { track_id: String },
    QueueChanged { length: usize, current_index: i64 },
    ModeChanged { mode: String },
    VolumeChanged { volume: f64 },
    Error {
        session_id: u64,
        track_id: Option<String>,
        message: String,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::Loading { .. } => "Resolving playback source",
            PlaybackEvent::Started { .. } => "Playback started",
            PlaybackEvent::Restored { .. } => "Playback restored",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Resumed { .. } => "Playback resumed",
            PlaybackEvent::Stopped { .. } => "Playback stopped",
            PlaybackEvent::Completed { .. } => "Track completed",
            PlaybackEvent::QueueChanged { .. } => "Queue changed",
            PlaybackEvent::ModeChanged { .. } => "Play mode changed",
            PlaybackEvent::VolumeChanged { .. } => "Volume changed",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Download Events
// ============================================================================

/// Download task transitions, emitted after the record is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    Queued { song_id: String, title: String },
    Started { song_id: String, file_path: String },
    /// Percent is clamped to 0..=99 while the transfer runs
    Progress { song_id: String, percent: u8 },
    Completed { song_id: String, file_path: String },
    Failed { song_id: String, message: String },
    Cancelled { song_id: String },
    /// The persisted record was removed
    Cleared { song_id: String },
}

impl DownloadEvent {
    fn description(&self) -> &str {
        match self {
            DownloadEvent::Queued { .. } => "Download queued",
            DownloadEvent::Started { .. } => "Download started",
            DownloadEvent::Progress { .. } => "Download in progress",
            DownloadEvent::Completed { .. } => "Download completed",
            DownloadEvent::Failed { .. } => "Download failed",
            DownloadEvent::Cancelled { .. } => "Download cancelled",
            DownloadEvent::Cleared { .. } => "Download record cleared",
        }
    }

    /// Song the event refers to
    pub fn song_id(&self) -> &str {
        match self {
            DownloadEvent::Queued { song_id, .. }
            | DownloadEvent::Started { song_id, .. }
            | DownloadEvent::Progress { song_id, .. }
            | DownloadEvent::Completed { song_id, .. }
            | DownloadEvent::Failed { song_id, .. }
            | DownloadEvent::Cancelled { song_id }
            | DownloadEvent::Cleared { song_id } => song_id,
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    LocalSongAdded { song_id: String, title: String },
    LocalSongRemoved { song_id: String },
    /// The recent-plays list changed
    RecentPlayRecorded { song_id: String },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::LocalSongAdded { .. } => "Local song imported",
            LibraryEvent::LocalSongRemoved { .. } => "Local song removed",
            LibraryEvent::RecentPlayRecorded { .. } => "Recent plays updated",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central publisher. Cloning is cheap and all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to every current subscriber
    ///
    /// Returns the number of subscribers reached, or an error when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Subscribe to all events published from now on
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Stop receiving events on `receiver`
    pub fn unsubscribe(&self, receiver: Receiver<CoreEvent>) {
        drop(receiver);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver that skips events rejected by a predicate
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |f| f(event))
    }

    /// Wait for the next matching event
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Take the next matching event if one is already buffered
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
