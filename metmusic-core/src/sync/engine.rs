//! Playback State Synchronizer
//!
//! Decides, for every server update and device notification, whether a track
//! switch, a pause or nothing is needed, and drives the output device.
//! Everything here is synchronous: time comes in as `now_ms` and anything
//! that has to wait (timers, HTTP) goes back out as an [`Effect`].

use tracing::{debug, info, warn};

use super::events::Effect;
use super::state::{ActiveTrack, PlaybackIdentity, PlayerSnapshot, SyncPhase};
use crate::config::PlayerConfig;
use crate::drift::{expected_position_secs, initial_seek_secs, DriftCorrector};
use crate::feed::{ConnectionState, PlaybackFeedback};
use crate::latency::{PreloadPlan, PreloadScheduler};
use crate::notify::{ChangeNotifier, PlayerChange, PlayerStatus};
use crate::output::{AudioOutput, DeviceEvent, PlayOutcome};
use crate::resolve::{ResolveError, ResolvedTrack, TrackCache};

pub struct Synchronizer {
    output: Box<dyn AudioOutput>,
    notifier: ChangeNotifier,
    cache: TrackCache,
    scheduler: PreloadScheduler,
    drift: DriftCorrector,
    tolerance_ms: f64,
    retry_secs: u64,
    /// Last significant identity; cleared on pause
    identity: Option<PlaybackIdentity>,
    active: Option<ActiveTrack>,
    /// Last successful resolution, survives pauses
    details: Option<ResolvedTrack>,
    phase: SyncPhase,
    is_playing: bool,
    seek_pending: bool,
    drift_running: bool,
    connection: ConnectionState,
}

impl Synchronizer {
    pub fn new(config: &PlayerConfig, output: Box<dyn AudioOutput>, notifier: ChangeNotifier) -> Self {
        Self {
            output,
            notifier,
            cache: TrackCache::new(),
            scheduler: PreloadScheduler::new(&config.sync),
            drift: DriftCorrector::new(config.sync.drift_threshold_secs),
            tolerance_ms: config.sync.identity_tolerance_ms,
            retry_secs: config.feed.reconnect_delay().as_secs(),
            identity: None,
            active: None,
            details: None,
            phase: SyncPhase::Idle,
            is_playing: false,
            seek_pending: false,
            drift_running: false,
            connection: ConnectionState::Disconnected,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn identity(&self) -> Option<&PlaybackIdentity> {
        self.identity.as_ref()
    }

    pub fn drift_running(&self) -> bool {
        self.drift_running
    }

    /// Apply a feedback message (received or synthesized)
    pub fn handle_feedback(&mut self, feedback: &PlaybackFeedback, now_ms: u64) -> Vec<Effect> {
        if !feedback.is_playing {
            return self.pause();
        }

        self.is_playing = true;
        let incoming = PlaybackIdentity::from_feedback(feedback);

        let significant = match &self.identity {
            Some(current) => current.differs_significantly(&incoming, self.tolerance_ms),
            None => true,
        };

        if !significant {
            return self.resume_drift_if_idle();
        }

        info!(
            "Playback changed: track={} start={:.0}",
            incoming.track_id, incoming.start_ms
        );
        self.identity = Some(incoming.clone());
        self.phase = SyncPhase::Preparing;

        match self.scheduler.plan(incoming.start_ms, now_ms) {
            PreloadPlan::Immediate => self.prepare(incoming, now_ms),
            PreloadPlan::Deferred(delay) => {
                debug!("Deferring preparation of {} by {:?}", incoming.track_id, delay);
                vec![Effect::SchedulePrepare {
                    identity: incoming,
                    delay,
                }]
            }
        }
    }

    /// A deferred prepare timer fired
    pub fn handle_prepare_due(&mut self, identity: PlaybackIdentity, now_ms: u64) -> Vec<Effect> {
        self.prepare(identity, now_ms)
    }

    /// A background resolution finished
    pub fn handle_resolved(
        &mut self,
        identity: PlaybackIdentity,
        result: Result<ResolvedTrack, ResolveError>,
        now_ms: u64,
    ) -> Vec<Effect> {
        let current = self.is_current(&identity);

        match result {
            Ok(track) => {
                self.cache.insert(track.clone());
                if current {
                    self.commit(identity, track, now_ms)
                } else {
                    debug!("Discarding stale resolution for {}", identity.track_id);
                    Vec::new()
                }
            }
            Err(e) => {
                warn!("Failed to resolve {}: {}", identity.track_id, e);
                if current {
                    // Whatever was playing keeps playing
                    self.phase = if self.active.is_some() {
                        SyncPhase::Playing
                    } else {
                        SyncPhase::Idle
                    };
                    self.notifier.notify(PlayerChange::Status(PlayerStatus::LinkFetchFailed));
                }
                Vec::new()
            }
        }
    }

    /// Apply a notification from the output device
    pub fn handle_device(&mut self, event: DeviceEvent, now_ms: u64) {
        match event {
            DeviceEvent::Ready => self.on_ready(now_ms),
            DeviceEvent::Playing => {
                if self.active.is_some() && self.is_playing {
                    self.phase = SyncPhase::Playing;
                }
                self.notifier.notify(PlayerChange::Status(PlayerStatus::Playing));
            }
            DeviceEvent::Paused => {
                if self.output.has_source() && !self.output.is_ended() {
                    self.notifier.notify(PlayerChange::Status(PlayerStatus::Paused));
                }
            }
            DeviceEvent::Ended => {
                self.notifier.notify(PlayerChange::Status(PlayerStatus::Ended));
            }
            DeviceEvent::TimeUpdate(seconds) => {
                let duration_known = self.output.duration().is_some_and(f64::is_finite);
                if seconds.is_finite() && duration_known {
                    self.notifier.notify(PlayerChange::Position { seconds });
                }
            }
            DeviceEvent::DurationChanged(seconds) => {
                if seconds.is_finite() {
                    self.notifier.notify(PlayerChange::Duration { seconds });
                }
            }
        }
    }

    /// Periodic drift check. Only the position is ever touched.
    pub fn handle_drift_tick(&mut self, now_ms: u64) {
        if !self.is_playing || !self.device_advancing() {
            return;
        }
        let Some(active) = &self.active else {
            return;
        };

        let expected = expected_position_secs(active.identity.start_ms, now_ms);
        let actual = self.output.position();

        if let Some(target) = self.drift.check(expected, actual) {
            self.output.set_position(target);
            self.notifier.notify(PlayerChange::DriftCorrected {
                from_secs: actual,
                to_secs: target,
            });
        }
    }

    /// Feed connection state changed
    pub fn handle_connection(&mut self, state: ConnectionState) -> Vec<Effect> {
        self.connection = state;
        self.notifier.notify(PlayerChange::Connection(state));

        let status = match state {
            ConnectionState::Connecting => PlayerStatus::Connecting,
            ConnectionState::Connected => PlayerStatus::Connected,
            ConnectionState::Disconnected => PlayerStatus::Disconnected {
                retry_secs: self.retry_secs,
            },
        };
        self.notifier.notify(PlayerChange::Status(status));

        if state == ConnectionState::Disconnected {
            self.stop_drift()
        } else {
            Vec::new()
        }
    }

    /// Feed channel reported an error
    pub fn handle_feed_error(&mut self, message: &str) {
        debug!("Feed error surfaced: {}", message);
        self.notifier.notify(PlayerChange::Status(PlayerStatus::ConnectionError));
    }

    /// Set output volume, clamped to 0..1
    pub fn set_volume(&mut self, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.output.set_volume(volume);
        self.notifier.notify(PlayerChange::Volume(volume));
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            is_playing: self.is_playing,
            track_id: self.identity.as_ref().map(|i| i.track_id.clone()),
            start_ms: self.identity.as_ref().map(|i| i.start_ms),
            details: self.details.clone(),
            phase: self.phase,
            connection: self.connection,
            average_loading_ms: self.scheduler.average_loading_ms(),
            preload_lead_ms: self.scheduler.preload_lead_ms(),
            drift_corrections: self.drift.corrections(),
            cached_tracks: self.cache.len(),
        }
    }

    fn is_current(&self, identity: &PlaybackIdentity) -> bool {
        self.identity.as_ref() == Some(identity)
    }

    fn device_advancing(&self) -> bool {
        self.output.has_source() && !self.output.is_paused() && !self.output.is_ended()
    }

    fn pause(&mut self) -> Vec<Effect> {
        let was_paused = self.phase == SyncPhase::Paused && self.identity.is_none();

        self.is_playing = false;
        self.identity = None;
        self.active = None;
        self.seek_pending = false;
        self.scheduler.cancel_measurement();
        self.phase = SyncPhase::Paused;

        if !self.output.is_paused() {
            self.output.pause();
        }

        if !was_paused {
            info!("Playback paused");
            self.notifier.notify(PlayerChange::Status(PlayerStatus::Paused));
            self.notifier.notify(PlayerChange::TrackCleared);
        }

        self.stop_drift()
    }

    fn prepare(&mut self, identity: PlaybackIdentity, now_ms: u64) -> Vec<Effect> {
        if !self.is_current(&identity) {
            debug!("Skipping superseded preparation of {}", identity.track_id);
            return Vec::new();
        }

        if let Some(track) = self.cache.get(&identity.track_id).cloned() {
            debug!("Cache hit for {}", identity.track_id);
            return self.commit(identity, track, now_ms);
        }

        self.notifier.notify(PlayerChange::Status(PlayerStatus::FetchingTrack));
        let track_id = identity.track_id.clone();
        vec![Effect::Resolve { identity, track_id }]
    }

    fn commit(&mut self, identity: PlaybackIdentity, track: ResolvedTrack, now_ms: u64) -> Vec<Effect> {
        info!("Loading {} from {}", identity.track_id, track.stream_url);

        self.output.assign_source(&track.stream_url);
        self.scheduler.mark_assigned(now_ms);
        self.seek_pending = true;
        self.phase = SyncPhase::Preparing;

        self.notifier.notify(PlayerChange::Status(PlayerStatus::Buffering));
        self.notifier.notify(PlayerChange::TrackCommitted {
            track_id: identity.track_id.clone(),
            start_ms: identity.start_ms,
            metadata: track.metadata_or_placeholder(),
        });

        self.details = Some(track.clone());
        self.active = Some(ActiveTrack { identity, track });
        self.drift_running = true;

        vec![Effect::StartDriftTimer]
    }

    fn on_ready(&mut self, now_ms: u64) {
        let Some(active) = &self.active else {
            return;
        };
        if !self.is_playing {
            return;
        }

        if self.seek_pending {
            let seek = initial_seek_secs(active.identity.start_ms, now_ms);
            self.output.set_position(seek);
            self.seek_pending = false;

            if let Some(load_ms) = self.scheduler.mark_ready(now_ms) {
                debug!("{} ready after {}ms, seeking to {:.2}s", active.identity.track_id, load_ms, seek);
            }
        }

        self.notifier.notify(PlayerChange::ReadyToPlay);

        match self.output.play() {
            PlayOutcome::Started => {}
            PlayOutcome::Blocked(reason) => {
                warn!("Playback blocked: {}", reason);
                self.notifier.notify(PlayerChange::Status(PlayerStatus::PlaybackBlocked));
            }
        }
    }

    fn resume_drift_if_idle(&mut self) -> Vec<Effect> {
        let matches = match (&self.active, &self.identity) {
            (Some(active), Some(identity)) => &active.identity == identity,
            _ => false,
        };
        if matches && !self.drift_running {
            self.drift_running = true;
            vec![Effect::StartDriftTimer]
        } else {
            Vec::new()
        }
    }

    fn stop_drift(&mut self) -> Vec<Effect> {
        if self.drift_running {
            self.drift_running = false;
            vec![Effect::StopDriftTimer]
        } else {
            Vec::new()
        }
    }
}
