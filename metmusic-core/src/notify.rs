//! Change notification
//!
//! The single integration point for UI. Every externally observable
//! transition produces one [`PlayerChange`], delivered synchronously to the
//! configured observer. Nothing is buffered or coalesced.

use std::fmt;
use std::sync::Arc;

use chrono::{Local, TimeZone};

use crate::feed::ConnectionState;
use crate::resolve::TrackMetadata;

/// User-facing player status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Connecting,
    Connected,
    /// Channel dropped; retrying after the given number of seconds
    Disconnected { retry_secs: u64 },
    ConnectionError,
    FetchingTrack,
    Buffering,
    Playing,
    Paused,
    Ended,
    LinkFetchFailed,
    /// The device refused to start without user interaction
    PlaybackBlocked,
}

impl PlayerStatus {
    pub fn message(&self) -> String {
        match self {
            PlayerStatus::Connecting => "Connecting to server...".to_string(),
            PlayerStatus::Connected => "Server connected".to_string(),
            PlayerStatus::Disconnected { retry_secs } => {
                format!("Connection lost, retrying in {} seconds...", retry_secs)
            }
            PlayerStatus::ConnectionError => "Connection error".to_string(),
            PlayerStatus::FetchingTrack => "Fetching track info...".to_string(),
            PlayerStatus::Buffering => "Buffering audio...".to_string(),
            PlayerStatus::Playing => "Playing".to_string(),
            PlayerStatus::Paused => "Paused".to_string(),
            PlayerStatus::Ended => "Playback ended".to_string(),
            PlayerStatus::LinkFetchFailed => "Failed to fetch track link".to_string(),
            PlayerStatus::PlaybackBlocked => {
                "Playback blocked, interaction required".to_string()
            }
        }
    }
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// An observable transition
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerChange {
    Status(PlayerStatus),
    Connection(ConnectionState),
    /// A new track was handed to the device
    TrackCommitted {
        track_id: String,
        start_ms: f64,
        metadata: TrackMetadata,
    },
    /// Nothing is playing any more
    TrackCleared,
    /// The device is ready and was asked to play
    ReadyToPlay,
    Position { seconds: f64 },
    Duration { seconds: f64 },
    /// The drift loop moved the device back onto the timeline
    DriftCorrected { from_secs: f64, to_secs: f64 },
    Volume(f32),
}

/// Receives every change. Implementations must not block.
pub trait PlayerObserver: Send + Sync {
    fn on_change(&self, change: &PlayerChange);
}

/// Dispatches changes to the configured observer; unset means no-op
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    hook: Option<Arc<dyn PlayerObserver>>,
}

impl ChangeNotifier {
    pub fn new(hook: Option<Arc<dyn PlayerObserver>>) -> Self {
        Self { hook }
    }

    pub fn notify(&self, change: PlayerChange) {
        tracing::trace!("Change: {:?}", change);
        if let Some(hook) = &self.hook {
            hook.on_change(&change);
        }
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("hooked", &self.hook.is_some())
            .finish()
    }
}

/// Sink for a piece of display text
pub type TextSink = Box<dyn Fn(&str) + Send + Sync>;

/// Sink for a numeric display value
pub type ValueSink = Box<dyn Fn(f64) + Send + Sync>;

/// Optional display widgets driven by player changes.
///
/// Every field is optional; unset sinks are simply skipped. Progress is
/// display-only, there is no way to seek through it.
#[derive(Default)]
pub struct DisplayBindings {
    pub status_text: Option<TextSink>,
    pub track_text: Option<TextSink>,
    pub start_time_text: Option<TextSink>,
    pub current_time_text: Option<TextSink>,
    pub duration_text: Option<TextSink>,
    pub progress_value: Option<ValueSink>,
    pub progress_max: Option<ValueSink>,
    pub volume_value: Option<ValueSink>,
}

fn set_text(sink: &Option<TextSink>, text: &str) {
    if let Some(sink) = sink {
        sink(text);
    }
}

fn set_value(sink: &Option<ValueSink>, value: f64) {
    if let Some(sink) = sink {
        sink(value);
    }
}

impl PlayerObserver for DisplayBindings {
    fn on_change(&self, change: &PlayerChange) {
        match change {
            PlayerChange::Status(status) => set_text(&self.status_text, &status.message()),
            PlayerChange::TrackCommitted { track_id, start_ms, .. } => {
                set_text(&self.track_text, track_id);
                set_text(&self.start_time_text, &format_start_time(*start_ms));
            }
            PlayerChange::TrackCleared => {
                set_text(&self.track_text, "-");
                set_text(&self.start_time_text, "-");
                set_value(&self.progress_value, 0.0);
                set_text(&self.current_time_text, "0:00");
            }
            PlayerChange::Position { seconds } => {
                set_value(&self.progress_value, *seconds);
                set_text(&self.current_time_text, &format_time(*seconds));
            }
            PlayerChange::Duration { seconds } => {
                set_value(&self.progress_max, *seconds);
                set_text(&self.duration_text, &format_time(*seconds));
            }
            PlayerChange::Volume(volume) => set_value(&self.volume_value, f64::from(*volume)),
            PlayerChange::Connection(_)
            | PlayerChange::ReadyToPlay
            | PlayerChange::DriftCorrected { .. } => {}
        }
    }
}

/// Format seconds as `m:ss`; invalid or negative input shows `0:00`
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let min = (seconds / 60.0).floor() as u64;
    let sec = (seconds % 60.0).floor() as u64;
    format!("{}:{:02}", min, sec)
}

/// Format an epoch-millisecond instant as a local date and time
pub fn format_start_time(start_ms: f64) -> String {
    format_instant(&Local, start_ms)
}

fn format_instant<Tz: TimeZone>(tz: &Tz, ms: f64) -> String
where
    Tz::Offset: fmt::Display,
{
    if !ms.is_finite() {
        return "-".to_string();
    }
    match tz.timestamp_millis_opt(ms.round() as i64).single() {
        Some(instant) => instant.format("%Y/%m/%d %H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}
