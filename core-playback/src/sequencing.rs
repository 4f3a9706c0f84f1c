//! Queue sequencing: which index plays next under each [`PlayMode`].
//!
//! Everything here is pure. The session controller owns the queue and calls
//! these with its current position; randomness is injected so shuffle can be
//! tested deterministically.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// Maximum number of indices kept for shuffle "previous"
pub const SHUFFLE_HISTORY_LIMIT: usize = 200;

/// Playback mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    /// Random next track, history-backed previous
    Shuffle,
    /// Front to back, stop at the end
    Order,
    /// Repeat the current track when it ends
    Single,
    /// Front to back, wrapping around
    #[default]
    List,
}

impl PlayMode {
    pub const ALL: [PlayMode; 4] = [
        PlayMode::Shuffle,
        PlayMode::Order,
        PlayMode::Single,
        PlayMode::List,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayMode::Shuffle => "shuffle",
            PlayMode::Order => "order",
            PlayMode::Single => "single",
            PlayMode::List => "list",
        }
    }

    /// shuffle → order → single → list → shuffle
    pub fn cycle(&self) -> PlayMode {
        match self {
            PlayMode::Shuffle => PlayMode::Order,
            PlayMode::Order => PlayMode::Single,
            PlayMode::Single => PlayMode::List,
            PlayMode::List => PlayMode::Shuffle,
        }
    }

    /// Parse a stored name, falling back to [`PlayMode::List`]
    pub fn parse_or_default(raw: &str) -> PlayMode {
        raw.parse().unwrap_or_default()
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlayMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s.trim())
            .ok_or_else(|| format!("Unknown play mode: {}", s))
    }
}

// ============================================================================
// Shuffle history
// ============================================================================

/// Stack of previously played indices for shuffle "previous".
///
/// Pushing the same index twice in a row is a no-op; beyond
/// [`SHUFFLE_HISTORY_LIMIT`] entries the oldest is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShuffleHistory {
    entries: VecDeque<usize>,
}

impl ShuffleHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, index: usize) {
        if self.entries.back() == Some(&index) {
            return;
        }
        self.entries.push_back(index);
        if self.entries.len() > SHUFFLE_HISTORY_LIMIT {
            self.entries.pop_front();
        }
    }

    pub fn pop(&mut self) -> Option<usize> {
        self.entries.pop_back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &usize> {
        self.entries.iter()
    }
}

// ============================================================================
// Navigation
// ============================================================================

/// What to do when a track finishes on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndAction {
    /// Play the same index again
    Replay,
    /// Move on as if the user pressed "next"
    Advance,
    /// Stay on the index and stop
    Stop,
}

/// Uniform random index other than `current` (0 when `len <= 1`)
pub fn shuffle_pick<R: Rng + ?Sized>(len: usize, current: Option<usize>, rng: &mut R) -> usize {
    if len <= 1 {
        return 0;
    }
    match current.filter(|&c| c < len) {
        Some(current) => {
            // Draw from len-1 slots and skip over `current`.
            let pick = rng.gen_range(0..len - 1);
            if pick >= current {
                pick + 1
            } else {
                pick
            }
        }
        None => rng.gen_range(0..len),
    }
}

/// Index for "next", or `None` when nothing should change.
///
/// In shuffle mode the current index is pushed to `history` first.
pub fn next_index<R: Rng + ?Sized>(
    mode: PlayMode,
    len: usize,
    current: Option<usize>,
    history: &mut ShuffleHistory,
    rng: &mut R,
) -> Option<usize> {
    if len == 0 {
        return None;
    }

    match mode {
        PlayMode::Shuffle => {
            if let Some(current) = current.filter(|&c| c < len) {
                history.push(current);
            }
            Some(shuffle_pick(len, current, rng))
        }
        PlayMode::Order => match current {
            Some(c) if c + 1 >= len => None,
            Some(c) => Some(c + 1),
            None => Some(0),
        },
        PlayMode::List | PlayMode::Single => Some(current.map_or(0, |c| (c + 1) % len)),
    }
}

/// Index for "previous", or `None` when nothing should change.
///
/// In shuffle mode this pops `history`; an empty history is a no-op.
pub fn previous_index(
    mode: PlayMode,
    len: usize,
    current: Option<usize>,
    history: &mut ShuffleHistory,
) -> Option<usize> {
    if len == 0 {
        return None;
    }

    match mode {
        PlayMode::Shuffle => {
            // Entries can outlive a shrinking queue.
            while let Some(index) = history.pop() {
                if index < len {
                    return Some(index);
                }
            }
            None
        }
        PlayMode::Order => Some(current.map_or(0, |c| c.saturating_sub(1))),
        PlayMode::List | PlayMode::Single => Some(current.map_or(len - 1, |c| (c + len - 1) % len)),
    }
}

/// Natural end-of-track behaviour
pub fn on_track_end(mode: PlayMode, len: usize, current: Option<usize>) -> EndAction {
    match mode {
        PlayMode::Single => EndAction::Replay,
        PlayMode::Order if current.map_or(true, |c| c + 1 >= len) => EndAction::Stop,
        _ => EndAction::Advance,
    }
}
