//! Reactor events and synchronizer effects

use std::time::Duration;

use super::state::PlaybackIdentity;
use crate::feed::FeedEvent;
use crate::output::DeviceEvent;
use crate::resolve::{ResolveError, ResolvedTrack};

/// Everything the reactor consumes, in arrival order
#[derive(Debug)]
pub enum PlayerEvent {
    /// Connection state, feedback or error from the push channel
    Feed(FeedEvent),
    /// A deferred prepare timer fired
    PrepareDue(PlaybackIdentity),
    /// A background resolution finished
    Resolved {
        identity: PlaybackIdentity,
        result: Result<ResolvedTrack, ResolveError>,
    },
    /// Notification from the output device
    Device(DeviceEvent),
    /// Periodic drift check
    DriftTick,
    SetVolume(f32),
    Shutdown,
}

impl From<FeedEvent> for PlayerEvent {
    fn from(event: FeedEvent) -> Self {
        PlayerEvent::Feed(event)
    }
}

/// Work the synchronizer asks the reactor to perform
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fire `PrepareDue(identity)` after `delay`
    SchedulePrepare {
        identity: PlaybackIdentity,
        delay: Duration,
    },
    /// Resolve `track_id` off the reactor and report back with `Resolved`
    Resolve {
        identity: PlaybackIdentity,
        track_id: String,
    },
    /// (Re)start the periodic drift check
    StartDriftTimer,
    StopDriftTimer,
}
