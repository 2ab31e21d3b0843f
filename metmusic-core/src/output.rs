//! Output device capability
//!
//! Any platform audio object that can load a URL, play, pause and seek is
//! enough. Decoding is entirely the device's business. Readiness, progress
//! and end notifications travel the other way, as [`DeviceEvent`]s fed into
//! the player.

/// Result of asking the device to start playing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Started,
    /// The platform refused autonomous playback (e.g. needs a user gesture)
    Blocked(String),
}

pub trait AudioOutput: Send {
    /// Load a new stream, replacing the current one
    fn assign_source(&mut self, url: &str);

    fn play(&mut self) -> PlayOutcome;

    fn pause(&mut self);

    /// Current position in seconds
    fn position(&self) -> f64;

    fn set_position(&mut self, seconds: f64);

    /// Duration in seconds, if known
    fn duration(&self) -> Option<f64>;

    /// Volume in 0.0 - 1.0
    fn set_volume(&mut self, volume: f32);

    fn is_paused(&self) -> bool;

    fn is_ended(&self) -> bool;

    fn has_source(&self) -> bool;
}

/// Notifications raised by the output device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Enough data is buffered to start playing
    Ready,
    Playing,
    Paused,
    Ended,
    /// Playback position advanced (seconds)
    TimeUpdate(f64),
    /// Duration became known or changed (seconds)
    DurationChanged(f64),
}
