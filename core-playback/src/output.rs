//! Host audio output seam.
//!
//! Decoding and device handling belong to the host. The core only tells the
//! output what to open and when to start, pause or seek. Commands are
//! synchronous so a session commit never yields halfway through.

use crate::error::Result;
use crate::source::PlayableSource;

pub trait AudioOutput: Send + Sync {
    /// Replace the current source. Does not start playback.
    fn load(&self, source: &PlayableSource) -> Result<()>;

    /// Start or resume the loaded source
    fn play(&self) -> Result<()>;

    fn pause(&self);

    /// Pause and drop the loaded source
    fn stop(&self);

    /// Jump to `position` seconds into the loaded source
    fn seek(&self, position: f64);

    /// `volume` is already clamped to `[0, 1]`
    fn set_volume(&self, volume: f64);
}

/// Output that accepts every command and produces no sound.
///
/// Used by headless hosts and as a stand-in until a device is attached.
#[derive(Debug, Default)]
pub struct NullAudioOutput;

impl AudioOutput for NullAudioOutput {
    fn load(&self, _source: &PlayableSource) -> Result<()> {
        Ok(())
    }

    fn play(&self) -> Result<()> {
        Ok(())
    }

    fn pause(&self) {}

    fn stop(&self) {}

    fn seek(&self, _position: f64) {}

    fn set_volume(&self, _volume: f64) {}
}
