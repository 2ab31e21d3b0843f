//! Player implementation for FFI

use std::sync::{Arc, Once};

use parking_lot::RwLock;
use tokio::runtime::Runtime;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::PlayerConfig;
use crate::notify::PlayerObserver;
use crate::output::DeviceEvent;
use crate::player::{self, PlayerHandle};
use crate::sync::PlayerSnapshot;

use super::types::*;

static TRACING_INIT: Once = Once::new();

const DEFAULT_LOG_FILTER: &str =
    "metmusic_core=debug,tungstenite=info,hyper_util=off,reqwest=off,hyper=off";

fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

        // A host app may already have installed a subscriber
        let _ = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_target(false)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

/// Synchronized player for one session
#[derive(uniffi::Object)]
pub struct Player {
    runtime: Runtime,
    session_id: String,
    config: PlayerConfig,
    handle: RwLock<Option<PlayerHandle>>,
}

#[uniffi::export]
impl Player {
    /// Create a player for `session_id`, optionally overriding defaults with
    /// a TOML document
    #[uniffi::constructor]
    pub fn new(session_id: String, config_toml: Option<String>) -> Result<Arc<Self>, PlayerError> {
        init_tracing();

        let config = match config_toml {
            Some(text) => PlayerConfig::from_toml_str(&text)
                .map_err(|e| PlayerError::InvalidConfig(e.to_string()))?,
            None => PlayerConfig::default(),
        };

        let runtime = Runtime::new().map_err(|e| PlayerError::Startup(e.to_string()))?;

        info!("Initializing metmusic-core player for session {}", session_id);

        Ok(Arc::new(Self {
            runtime,
            session_id,
            config,
            handle: RwLock::new(None),
        }))
    }

    pub fn session_id(&self) -> String {
        self.session_id.clone()
    }

    /// Connect to the feed and start driving `device`
    pub fn start(
        &self,
        device: Box<dyn AudioDevice>,
        callback: Box<dyn PlayerCallback>,
    ) -> Result<(), PlayerError> {
        let mut handle = self.handle.write();
        if handle.is_some() {
            return Err(PlayerError::AlreadyRunning);
        }

        let _guard = self.runtime.enter();
        let observer: Arc<dyn PlayerObserver> = Arc::new(CallbackAdapter(callback));
        let started = player::start(
            &self.config,
            &self.session_id,
            Box::new(DeviceAdapter(device)),
            Some(observer),
        )
        .map_err(|e| PlayerError::Startup(e.to_string()))?;

        *handle = Some(started);
        Ok(())
    }

    /// Disconnect and stop the reactor. The device is left as it is.
    pub fn stop(&self) -> Result<(), PlayerError> {
        let handle = self.handle.write().take().ok_or(PlayerError::NotRunning)?;
        handle.shutdown();
        info!("Player stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle.read().is_some()
    }

    /// Current state; defaults when not running
    pub fn status(&self) -> PlayerState {
        let snapshot = self
            .handle
            .read()
            .as_ref()
            .map(PlayerHandle::status)
            .unwrap_or_else(PlayerSnapshot::default);
        PlayerState::from(&snapshot)
    }

    /// Set output volume (0.0 - 1.0, clamped)
    pub fn set_volume(&self, volume: f32) -> Result<(), PlayerError> {
        let handle = self.handle.read();
        let handle = handle.as_ref().ok_or(PlayerError::NotRunning)?;
        handle.set_volume(volume);
        Ok(())
    }

    /// The device has buffered enough to play
    pub fn device_ready(&self) {
        self.forward(DeviceEvent::Ready);
    }

    pub fn device_playing(&self) {
        self.forward(DeviceEvent::Playing);
    }

    pub fn device_paused(&self) {
        self.forward(DeviceEvent::Paused);
    }

    pub fn device_ended(&self) {
        self.forward(DeviceEvent::Ended);
    }

    pub fn device_time_update(&self, position_secs: f64) {
        self.forward(DeviceEvent::TimeUpdate(position_secs));
    }

    pub fn device_duration_changed(&self, duration_secs: f64) {
        self.forward(DeviceEvent::DurationChanged(duration_secs));
    }
}

impl Player {
    fn forward(&self, event: DeviceEvent) {
        match self.handle.read().as_ref() {
            Some(handle) => handle.device_event(event),
            None => debug!("Ignoring device event while stopped: {:?}", event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = Player::new("s1".to_string(), Some("[sync\nbroken".to_string()));
        assert!(matches!(result, Err(PlayerError::InvalidConfig(_))));
    }

    #[test]
    fn test_stopped_player() {
        let player = Player::new("s1".to_string(), None).unwrap();
        assert_eq!(player.session_id(), "s1");
        assert!(!player.is_running());
        assert!(matches!(player.stop(), Err(PlayerError::NotRunning)));
        assert!(matches!(player.set_volume(0.5), Err(PlayerError::NotRunning)));

        // Device notifications before start are dropped
        player.device_time_update(1.0);

        let state = player.status();
        assert!(!state.is_playing);
        assert_eq!(state.connection, ConnectionStatus::Disconnected);
    }
}
