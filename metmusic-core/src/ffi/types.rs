//! FFI types exposed via uniffi

use crate::feed::ConnectionState;
use crate::notify::{PlayerChange, PlayerStatus};
use crate::output::{AudioOutput, PlayOutcome};
use crate::resolve::ResolvedTrack;
use crate::sync::{PlayerSnapshot, SyncPhase};

/// Error types exposed via FFI
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum PlayerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to start player: {0}")]
    Startup(String),

    #[error("Player is already running")]
    AlreadyRunning,

    #[error("Player is not running")]
    NotRunning,
}

/// Feed connection state exposed via FFI
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl From<ConnectionState> for ConnectionStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connecting => Self::Connecting,
            ConnectionState::Connected => Self::Connected,
            ConnectionState::Disconnected => Self::Disconnected,
        }
    }
}

/// User-facing status exposed via FFI
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum StatusKind {
    Connecting,
    Connected,
    Disconnected { retry_secs: u64 },
    ConnectionError,
    FetchingTrack,
    Buffering,
    Playing,
    Paused,
    Ended,
    LinkFetchFailed,
    PlaybackBlocked,
}

impl From<PlayerStatus> for StatusKind {
    fn from(status: PlayerStatus) -> Self {
        match status {
            PlayerStatus::Connecting => Self::Connecting,
            PlayerStatus::Connected => Self::Connected,
            PlayerStatus::Disconnected { retry_secs } => Self::Disconnected { retry_secs },
            PlayerStatus::ConnectionError => Self::ConnectionError,
            PlayerStatus::FetchingTrack => Self::FetchingTrack,
            PlayerStatus::Buffering => Self::Buffering,
            PlayerStatus::Playing => Self::Playing,
            PlayerStatus::Paused => Self::Paused,
            PlayerStatus::Ended => Self::Ended,
            PlayerStatus::LinkFetchFailed => Self::LinkFetchFailed,
            PlayerStatus::PlaybackBlocked => Self::PlaybackBlocked,
        }
    }
}

/// Synchronizer phase exposed via FFI
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SyncState {
    Idle,
    Preparing,
    Playing,
    Paused,
}

impl From<SyncPhase> for SyncState {
    fn from(phase: SyncPhase) -> Self {
        match phase {
            SyncPhase::Idle => Self::Idle,
            SyncPhase::Preparing => Self::Preparing,
            SyncPhase::Playing => Self::Playing,
            SyncPhase::Paused => Self::Paused,
        }
    }
}

/// Last resolved track exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct TrackDetails {
    pub track_id: String,
    pub stream_url: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: String,
    /// Raw lookup response as JSON text
    pub response_json: String,
}

impl From<&ResolvedTrack> for TrackDetails {
    fn from(track: &ResolvedTrack) -> Self {
        let metadata = track.metadata_or_placeholder();
        Self {
            track_id: track.track_id.clone(),
            stream_url: track.stream_url.clone(),
            title: metadata.title,
            artists: metadata.artists,
            album: metadata.album,
            response_json: track.response.to_string(),
        }
    }
}

/// Player state (for polling) exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct PlayerState {
    pub is_playing: bool,
    pub track_id: Option<String>,
    /// Authoritative start instant (ms since epoch)
    pub start_ms: Option<f64>,
    pub track_details: Option<TrackDetails>,
    pub phase: SyncState,
    pub connection: ConnectionStatus,
    pub average_loading_ms: f64,
    pub preload_lead_ms: f64,
    pub drift_corrections: u64,
    pub cached_tracks: u64,
}

impl From<&PlayerSnapshot> for PlayerState {
    fn from(s: &PlayerSnapshot) -> Self {
        Self {
            is_playing: s.is_playing,
            track_id: s.track_id.clone(),
            start_ms: s.start_ms,
            track_details: s.details.as_ref().map(TrackDetails::from),
            phase: s.phase.into(),
            connection: s.connection.into(),
            average_loading_ms: s.average_loading_ms,
            preload_lead_ms: s.preload_lead_ms,
            drift_corrections: s.drift_corrections,
            cached_tracks: s.cached_tracks as u64,
        }
    }
}

/// A single observable change exposed via FFI
#[derive(Debug, Clone, PartialEq, uniffi::Enum)]
pub enum PlayerUpdate {
    Status { kind: StatusKind, message: String },
    Connection { status: ConnectionStatus },
    TrackCommitted {
        track_id: String,
        start_ms: f64,
        title: String,
        artist: String,
        album: String,
    },
    TrackCleared,
    ReadyToPlay,
    Position { seconds: f64 },
    Duration { seconds: f64 },
    DriftCorrected { from_secs: f64, to_secs: f64 },
    Volume { volume: f32 },
}

impl From<&PlayerChange> for PlayerUpdate {
    fn from(change: &PlayerChange) -> Self {
        match change {
            PlayerChange::Status(status) => Self::Status {
                kind: (*status).into(),
                message: status.message(),
            },
            PlayerChange::Connection(state) => Self::Connection {
                status: (*state).into(),
            },
            PlayerChange::TrackCommitted {
                track_id,
                start_ms,
                metadata,
            } => Self::TrackCommitted {
                track_id: track_id.clone(),
                start_ms: *start_ms,
                title: metadata.title.clone(),
                artist: metadata.artist_line(),
                album: metadata.album.clone(),
            },
            PlayerChange::TrackCleared => Self::TrackCleared,
            PlayerChange::ReadyToPlay => Self::ReadyToPlay,
            PlayerChange::Position { seconds } => Self::Position { seconds: *seconds },
            PlayerChange::Duration { seconds } => Self::Duration { seconds: *seconds },
            PlayerChange::DriftCorrected { from_secs, to_secs } => Self::DriftCorrected {
                from_secs: *from_secs,
                to_secs: *to_secs,
            },
            PlayerChange::Volume(volume) => Self::Volume { volume: *volume },
        }
    }
}

/// Result of asking the native audio object to play
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum PlayResult {
    Started,
    /// Autonomous playback refused (e.g. needs a user gesture)
    Blocked { reason: String },
}

impl From<PlayResult> for PlayOutcome {
    fn from(result: PlayResult) -> Self {
        match result {
            PlayResult::Started => PlayOutcome::Started,
            PlayResult::Blocked { reason } => PlayOutcome::Blocked(reason),
        }
    }
}

/// Native audio object. Notifications go back through the `Player::device_*` methods.
#[uniffi::export(callback_interface)]
pub trait AudioDevice: Send + Sync {
    fn assign_source(&self, url: String);
    fn play(&self) -> PlayResult;
    fn pause(&self);
    fn position(&self) -> f64;
    fn set_position(&self, seconds: f64);
    fn duration(&self) -> Option<f64>;
    fn set_volume(&self, volume: f32);
    fn is_paused(&self) -> bool;
    fn is_ended(&self) -> bool;
    fn has_source(&self) -> bool;
}

/// Callback interface for player changes
#[uniffi::export(callback_interface)]
pub trait PlayerCallback: Send + Sync {
    fn on_change(&self, update: PlayerUpdate);
}

/// Drives a native [`AudioDevice`] as the player's output
pub(crate) struct DeviceAdapter(pub Box<dyn AudioDevice>);

impl AudioOutput for DeviceAdapter {
    fn assign_source(&mut self, url: &str) {
        self.0.assign_source(url.to_string());
    }

    fn play(&mut self) -> PlayOutcome {
        self.0.play().into()
    }

    fn pause(&mut self) {
        self.0.pause();
    }

    fn position(&self) -> f64 {
        self.0.position()
    }

    fn set_position(&mut self, seconds: f64) {
        self.0.set_position(seconds);
    }

    fn duration(&self) -> Option<f64> {
        self.0.duration()
    }

    fn set_volume(&mut self, volume: f32) {
        self.0.set_volume(volume);
    }

    fn is_paused(&self) -> bool {
        self.0.is_paused()
    }

    fn is_ended(&self) -> bool {
        self.0.is_ended()
    }

    fn has_source(&self) -> bool {
        self.0.has_source()
    }
}

/// Forwards player changes to a native [`PlayerCallback`]
pub(crate) struct CallbackAdapter(pub Box<dyn PlayerCallback>);

impl crate::notify::PlayerObserver for CallbackAdapter {
    fn on_change(&self, change: &PlayerChange) {
        self.0.on_change(PlayerUpdate::from(change));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::TrackMetadata;

    #[test]
    fn test_update_conversion() {
        let update = PlayerUpdate::from(&PlayerChange::Status(PlayerStatus::Disconnected {
            retry_secs: 5,
        }));
        assert_eq!(
            update,
            PlayerUpdate::Status {
                kind: StatusKind::Disconnected { retry_secs: 5 },
                message: "Connection lost, retrying in 5 seconds...".to_string(),
            }
        );

        let update = PlayerUpdate::from(&PlayerChange::TrackCommitted {
            track_id: "A".to_string(),
            start_ms: 1.0,
            metadata: TrackMetadata {
                title: "Song".to_string(),
                artists: vec!["X".to_string(), "Y".to_string()],
                album: "Album".to_string(),
            },
        });
        assert_eq!(
            update,
            PlayerUpdate::TrackCommitted {
                track_id: "A".to_string(),
                start_ms: 1.0,
                title: "Song".to_string(),
                artist: "X / Y".to_string(),
                album: "Album".to_string(),
            }
        );
    }

    #[test]
    fn test_state_conversion() {
        let snapshot = PlayerSnapshot {
            cached_tracks: 3,
            ..PlayerSnapshot::default()
        };
        let state = PlayerState::from(&snapshot);
        assert_eq!(state.cached_tracks, 3);
        assert_eq!(state.phase, SyncState::Idle);
        assert_eq!(state.connection, ConnectionStatus::Disconnected);
        assert!(state.track_details.is_none());
    }
}
