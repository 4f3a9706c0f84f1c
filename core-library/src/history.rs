//! Recently played songs.

use crate::error::Result;
use crate::models::{RecentPlay, Track};
use crate::repositories::RecentPlayRepository;
use bridge_traits::time::Clock;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use std::sync::Arc;
use tracing::debug;

/// Writes and reads the recent-plays list, notifying listeners on change.
pub struct PlayHistory {
    repository: Arc<dyn RecentPlayRepository>,
    clock: Arc<dyn Clock>,
    events: Option<EventBus>,
}

impl PlayHistory {
    pub fn new(repository: Arc<dyn RecentPlayRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            clock,
            events: None,
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Stamp `track` as played now
    pub async fn record(&self, track: &Track) -> Result<()> {
        let play = RecentPlay::from_track(track, self.clock.unix_timestamp_millis());
        self.repository.record(&play).await?;
        debug!(song_id = %track.id, "Recorded recent play");

        if let Some(bus) = &self.events {
            let _ = bus.emit(CoreEvent::Library(LibraryEvent::RecentPlayRecorded {
                song_id: track.id.clone(),
            }));
        }
        Ok(())
    }

    /// Newest first, at most `limit` entries
    pub async fn list(&self, limit: i64) -> Result<Vec<RecentPlay>> {
        self.repository.list(limit).await
    }
}
