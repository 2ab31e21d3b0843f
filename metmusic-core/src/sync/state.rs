//! Synchronizer state

use crate::feed::{ConnectionState, PlaybackFeedback};
use crate::resolve::ResolvedTrack;

/// What is playing and since when. Used to tell genuine changes apart from
/// repeated reports of the same state.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackIdentity {
    pub track_id: String,
    /// Authoritative start instant (ms since epoch)
    pub start_ms: f64,
}

impl PlaybackIdentity {
    pub fn new(track_id: impl Into<String>, start_ms: f64) -> Self {
        Self {
            track_id: track_id.into(),
            start_ms,
        }
    }

    pub fn from_feedback(feedback: &PlaybackFeedback) -> Self {
        Self::new(feedback.track_id.clone(), feedback.authoritative_start_ms())
    }

    /// A different track, or the same track restarted/seeked by more than
    /// `tolerance_ms`
    pub fn differs_significantly(&self, other: &PlaybackIdentity, tolerance_ms: f64) -> bool {
        self.track_id != other.track_id || (self.start_ms - other.start_ms).abs() > tolerance_ms
    }
}

/// Synchronizer state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Nothing requested yet
    Idle,
    /// A track is being resolved or buffered
    Preparing,
    Playing,
    Paused,
}

/// The track currently handed to the device
#[derive(Debug, Clone)]
pub(crate) struct ActiveTrack {
    pub identity: PlaybackIdentity,
    pub track: ResolvedTrack,
}

/// Point-in-time view of the player
#[derive(Debug, Clone)]
pub struct PlayerSnapshot {
    pub is_playing: bool,
    pub track_id: Option<String>,
    pub start_ms: Option<f64>,
    /// Last successful resolution, kept across pauses
    pub details: Option<ResolvedTrack>,
    pub phase: SyncPhase,
    pub connection: ConnectionState,
    pub average_loading_ms: f64,
    pub preload_lead_ms: f64,
    pub drift_corrections: u64,
    pub cached_tracks: usize,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            is_playing: false,
            track_id: None,
            start_ms: None,
            details: None,
            phase: SyncPhase::Idle,
            connection: ConnectionState::Disconnected,
            average_loading_ms: 0.0,
            preload_lead_ms: 0.0,
            drift_corrections: 0,
            cached_tracks: 0,
        }
    }
}
