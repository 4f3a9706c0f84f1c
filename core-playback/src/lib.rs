//! # Playback Module
//!
//! Decides what to play and from where.
//!
//! ## Overview
//!
//! - [`resolver`]: picks the best source for a track (local import, completed
//!   download, stream cache, remote stream) and fills the cache on the way
//! - [`session`]: the queue and the session-id guard that keeps overlapping
//!   play requests from clobbering each other
//! - [`sequencing`]: next/previous/end-of-track rules for each play mode
//! - [`snapshot`]: the persisted resume point and player preferences
//! - [`output`]: the host seam that actually makes sound

pub mod config;
pub mod error;
pub mod output;
pub mod resolver;
pub mod sequencing;
pub mod session;
pub mod snapshot;
pub mod source;

pub use config::{ResolverConfig, ResolverConfigBuilder};
pub use error::{PlaybackError, Result};
pub use output::{AudioOutput, NullAudioOutput};
pub use resolver::{SourceResolver, TrackResolver};
pub use sequencing::{EndAction, PlayMode, ShuffleHistory, SHUFFLE_HISTORY_LIMIT};
pub use session::{PlayOutcome, PlaybackView, SessionController};
pub use snapshot::{PlaybackSnapshot, PlayerPreferences, SnapshotStore};
pub use source::{PlayableSource, SourceHandle, SourceKind};
