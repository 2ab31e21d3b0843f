//! Player reactor
//!
//! One task owns the [`Synchronizer`] and consumes a single event queue
//! strictly one at a time, in arrival order. The feed manager, timers, HTTP
//! lookups and the drift loop all run as separate tasks that only ever report
//! back through that queue.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::PlayerConfig;
use crate::current_time_ms;
use crate::feed::{FeedEvent, FeedHandle, FeedManager};
use crate::notify::{ChangeNotifier, PlayerObserver};
use crate::output::{AudioOutput, DeviceEvent};
use crate::resolve::{ResolveError, ResolverClient};
use crate::sync::{Effect, PlayerEvent, PlayerSnapshot, Synchronizer};

/// Handle to a running player. Dropping it does not stop the player; call
/// [`PlayerHandle::shutdown`].
#[derive(Clone)]
pub struct PlayerHandle {
    event_tx: mpsc::UnboundedSender<PlayerEvent>,
    feed: FeedHandle,
    snapshot: Arc<RwLock<PlayerSnapshot>>,
}

impl PlayerHandle {
    /// Forward a notification from the output device
    pub fn device_event(&self, event: DeviceEvent) {
        let _ = self.event_tx.send(PlayerEvent::Device(event));
    }

    pub fn set_volume(&self, volume: f32) {
        let _ = self.event_tx.send(PlayerEvent::SetVolume(volume));
    }

    /// Latest state published by the reactor
    pub fn status(&self) -> PlayerSnapshot {
        self.snapshot.read().clone()
    }

    /// Close the feed and stop the reactor
    pub fn shutdown(&self) {
        self.feed.shutdown();
        let _ = self.event_tx.send(PlayerEvent::Shutdown);
    }
}

/// Start a player for `session_id`. Must be called from within a tokio runtime.
pub fn start(
    config: &PlayerConfig,
    session_id: &str,
    output: Box<dyn AudioOutput>,
    observer: Option<Arc<dyn PlayerObserver>>,
) -> Result<PlayerHandle, ResolveError> {
    let resolver = ResolverClient::new(&config.resolver)?;
    let mut sync = Synchronizer::new(config, output, ChangeNotifier::new(observer));
    sync.set_volume(config.sync.initial_volume);

    let snapshot = Arc::new(RwLock::new(sync.snapshot()));
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let feed = FeedManager::new(session_id, &config.feed).start_into(event_tx.clone());

    let reactor = Reactor {
        sync,
        resolver,
        event_tx: event_tx.clone(),
        drift_interval: config.sync.drift_interval(),
        drift_cancel: None,
        snapshot: Arc::clone(&snapshot),
    };
    tokio::spawn(reactor.run(event_rx));

    info!("Player started for session {}", session_id);

    Ok(PlayerHandle {
        event_tx,
        feed,
        snapshot,
    })
}

struct Reactor {
    sync: Synchronizer,
    resolver: ResolverClient,
    /// For tasks spawned by the reactor to report back
    event_tx: mpsc::UnboundedSender<PlayerEvent>,
    drift_interval: Duration,
    drift_cancel: Option<oneshot::Sender<()>>,
    snapshot: Arc<RwLock<PlayerSnapshot>>,
}

impl Reactor {
    async fn run(mut self, mut event_rx: mpsc::UnboundedReceiver<PlayerEvent>) {
        while let Some(event) = event_rx.recv().await {
            let effects = match event {
                PlayerEvent::Shutdown => break,
                event => self.on_player_event(event),
            };

            for effect in effects {
                self.apply(effect);
            }
            *self.snapshot.write() = self.sync.snapshot();
        }

        self.stop_drift_loop();
        info!("Player reactor stopped");
    }

    fn on_feed_event(&mut self, event: FeedEvent) -> Vec<Effect> {
        match event {
            FeedEvent::State(state) => self.sync.handle_connection(state),
            FeedEvent::Feedback(feedback) => self.sync.handle_feedback(&feedback, current_time_ms()),
            FeedEvent::Error(message) => {
                self.sync.handle_feed_error(&message);
                Vec::new()
            }
        }
    }

    fn on_player_event(&mut self, event: PlayerEvent) -> Vec<Effect> {
        let now = current_time_ms();
        match event {
            PlayerEvent::Feed(event) => self.on_feed_event(event),
            PlayerEvent::PrepareDue(identity) => self.sync.handle_prepare_due(identity, now),
            PlayerEvent::Resolved { identity, result } => {
                self.sync.handle_resolved(identity, result, now)
            }
            PlayerEvent::Device(event) => {
                self.sync.handle_device(event, now);
                Vec::new()
            }
            PlayerEvent::DriftTick => {
                self.sync.handle_drift_tick(now);
                Vec::new()
            }
            PlayerEvent::SetVolume(volume) => {
                self.sync.set_volume(volume);
                Vec::new()
            }
            PlayerEvent::Shutdown => Vec::new(),
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::SchedulePrepare { identity, delay } => {
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(PlayerEvent::PrepareDue(identity));
                });
            }
            Effect::Resolve { identity, track_id } => {
                let tx = self.event_tx.clone();
                let resolver = self.resolver.clone();
                tokio::spawn(async move {
                    let result = resolver.resolve(&track_id).await;
                    let _ = tx.send(PlayerEvent::Resolved { identity, result });
                });
            }
            Effect::StartDriftTimer => self.start_drift_loop(),
            Effect::StopDriftTimer => self.stop_drift_loop(),
        }
    }

    /// Start the periodic drift check, replacing any running one
    fn start_drift_loop(&mut self) {
        self.stop_drift_loop();

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        self.drift_cancel = Some(cancel_tx);

        let tx = self.event_tx.clone();
        let period = self.drift_interval;

        tokio::spawn(async move {
            debug!("Drift loop started");
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    _ = interval.tick() => {
                        if tx.send(PlayerEvent::DriftTick).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Drift loop ended");
        });
    }

    fn stop_drift_loop(&mut self) {
        if let Some(tx) = self.drift_cancel.take() {
            let _ = tx.send(());
        }
    }
}
