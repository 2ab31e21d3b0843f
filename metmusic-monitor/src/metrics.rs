//! Listener state tracked for the dashboard

use chrono::{DateTime, Local};
use metmusic_core::notify::format_start_time;
use metmusic_core::{ConnectionState, PlayerChange, PlayerObserver, PlayerSnapshot, PlayerStatus};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

/// Maximum number of log entries to keep
const MAX_LOG_ENTRIES: usize = 100;

/// A log entry for the dashboard
#[derive(Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Connection,
    Track,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Connection => "CONN",
            LogLevel::Track => "TRACK",
        }
    }
}

/// Track currently handed to the probe
#[derive(Clone, Debug, PartialEq)]
pub struct TrackView {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub start_ms: f64,
}

/// Listener metrics
pub struct Metrics {
    /// Monitor start time
    pub start_time: DateTime<Local>,

    pub session_id: String,

    pub connection: ConnectionState,

    /// Latest status
    pub status: Option<PlayerStatus>,

    pub track: Option<TrackView>,

    /// Times the feed came back after dropping
    pub reconnects: u64,

    /// Tracks committed since start
    pub tracks_loaded: u64,

    pub drift_corrections: u64,

    pub volume: f32,

    /// Last snapshot pulled from the player
    pub snapshot: PlayerSnapshot,

    /// Log entries
    pub logs: VecDeque<LogEntry>,

    /// Whether the feed has ever connected
    seen_connected: bool,
}

impl Metrics {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            start_time: Local::now(),
            session_id: session_id.into(),
            connection: ConnectionState::Disconnected,
            status: None,
            track: None,
            reconnects: 0,
            tracks_loaded: 0,
            drift_corrections: 0,
            volume: 1.0,
            snapshot: PlayerSnapshot::default(),
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            seen_connected: false,
        }
    }

    /// Add a log entry
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.logs.len() >= MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            timestamp: Local::now(),
            level,
            message: message.into(),
        });
    }

    /// Fold a player change into the metrics
    pub fn apply(&mut self, change: &PlayerChange) {
        match change {
            PlayerChange::Status(status) => {
                self.status = Some(*status);
                let level = match status {
                    PlayerStatus::ConnectionError | PlayerStatus::LinkFetchFailed => LogLevel::Error,
                    PlayerStatus::PlaybackBlocked | PlayerStatus::Disconnected { .. } => LogLevel::Warning,
                    _ => LogLevel::Info,
                };
                self.log(level, status.message());
            }
            PlayerChange::Connection(state) => {
                if *state == ConnectionState::Connected {
                    if self.seen_connected {
                        self.reconnects += 1;
                    }
                    self.seen_connected = true;
                }
                self.connection = *state;
                self.log(LogLevel::Connection, format!("Feed {:?}", state));
            }
            PlayerChange::TrackCommitted {
                track_id,
                start_ms,
                metadata,
            } => {
                self.tracks_loaded += 1;
                self.track = Some(TrackView {
                    track_id: track_id.clone(),
                    title: metadata.title.clone(),
                    artist: metadata.artist_line(),
                    album: metadata.album.clone(),
                    start_ms: *start_ms,
                });
                self.log(
                    LogLevel::Track,
                    format!(
                        "Loaded {} - {} ({}), started {}",
                        metadata.title,
                        metadata.artist_line(),
                        track_id,
                        format_start_time(*start_ms)
                    ),
                );
            }
            PlayerChange::TrackCleared => {
                self.track = None;
            }
            PlayerChange::DriftCorrected { from_secs, to_secs } => {
                self.drift_corrections += 1;
                self.log(
                    LogLevel::Warning,
                    format!("Drift corrected: {:.2}s -> {:.2}s", from_secs, to_secs),
                );
            }
            PlayerChange::Volume(volume) => self.volume = *volume,
            PlayerChange::ReadyToPlay => self.log(LogLevel::Track, "Ready to play"),
            PlayerChange::Position { .. } | PlayerChange::Duration { .. } => {}
        }
    }

    /// Get uptime as formatted string
    pub fn uptime(&self) -> String {
        let duration = Local::now().signed_duration_since(self.start_time);
        format_uptime(duration.num_seconds())
    }
}

fn format_uptime(secs: i64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        format!("{}h {}m", hours, mins)
    }
}

/// Feeds player changes into shared metrics
pub struct MetricsObserver(pub Arc<RwLock<Metrics>>);

impl PlayerObserver for MetricsObserver {
    fn on_change(&self, change: &PlayerChange) {
        self.0.write().apply(change);
    }
}

/// Truncate an identifier for display (show first and last few chars)
pub fn truncate_id(id: &str) -> String {
    if id.chars().count() > 16 {
        let head: String = id.chars().take(8).collect();
        let tail: String = id.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
        format!("{}...{}", head, tail)
    } else {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metmusic_core::TrackMetadata;

    #[test]
    fn test_reconnects_counted_after_first_connect() {
        let mut m = Metrics::new("s1");
        m.apply(&PlayerChange::Connection(ConnectionState::Connecting));
        m.apply(&PlayerChange::Connection(ConnectionState::Connected));
        assert_eq!(m.reconnects, 0);

        m.apply(&PlayerChange::Connection(ConnectionState::Disconnected));
        m.apply(&PlayerChange::Connection(ConnectionState::Connecting));
        m.apply(&PlayerChange::Connection(ConnectionState::Connected));
        assert_eq!(m.reconnects, 1);
        assert_eq!(m.connection, ConnectionState::Connected);
    }

    #[test]
    fn test_track_lifecycle() {
        let mut m = Metrics::new("s1");
        m.apply(&PlayerChange::TrackCommitted {
            track_id: "A".to_string(),
            start_ms: 1_700_000_000_000.0,
            metadata: TrackMetadata {
                title: "Song".to_string(),
                artists: vec!["X".to_string()],
                album: "Album".to_string(),
            },
        });
        assert_eq!(m.tracks_loaded, 1);
        assert_eq!(m.track.as_ref().map(|t| t.artist.as_str()), Some("X"));

        m.apply(&PlayerChange::TrackCleared);
        assert!(m.track.is_none());
        assert_eq!(m.logs.back().map(|l| l.level), Some(LogLevel::Track));
    }

    #[test]
    fn test_status_levels() {
        let mut m = Metrics::new("s1");
        m.apply(&PlayerChange::Status(PlayerStatus::LinkFetchFailed));
        m.apply(&PlayerChange::Status(PlayerStatus::Playing));
        let levels: Vec<LogLevel> = m.logs.iter().map(|l| l.level).collect();
        assert_eq!(levels, vec![LogLevel::Error, LogLevel::Info]);
        assert_eq!(m.status, Some(PlayerStatus::Playing));
    }

    #[test]
    fn test_log_is_bounded() {
        let mut m = Metrics::new("s1");
        for i in 0..150 {
            m.log(LogLevel::Info, format!("entry {}", i));
        }
        assert_eq!(m.logs.len(), MAX_LOG_ENTRIES);
        assert_eq!(m.logs.front().map(|l| l.message.as_str()), Some("entry 50"));
    }

    #[test]
    fn test_formatting_helpers() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m 5s");
        assert_eq!(format_uptime(7260), "2h 1m");
        assert_eq!(truncate_id("short"), "short");
        assert_eq!(truncate_id("0123456789abcdefXYZ"), "01234567...fXYZ");
    }
}
