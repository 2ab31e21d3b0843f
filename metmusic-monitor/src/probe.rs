//! Virtual output device
//!
//! Stands in for a speaker: on every new source it fetches the head of the
//! stream to prove the URL is playable, then reports ready. Position is
//! tracked against the wall clock while "playing".

use metmusic_core::{AudioOutput, DeviceEvent, PlayOutcome};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Bytes requested when probing a stream
const PROBE_BYTES: u64 = 64 * 1024;

#[derive(Debug, Default)]
struct ProbeState {
    source: Option<String>,
    paused: bool,
    ended: bool,
    /// Position at the last anchor point (seconds)
    base_secs: f64,
    /// Set while playing
    anchor: Option<Instant>,
    /// Bumped on every assignment so late probes for old sources are ignored
    generation: u64,
}

impl ProbeState {
    fn position(&self) -> f64 {
        match self.anchor {
            Some(at) => self.base_secs + at.elapsed().as_secs_f64(),
            None => self.base_secs,
        }
    }
}

/// Probe device plugged into the player
pub struct StreamProbe {
    state: Arc<Mutex<ProbeState>>,
    http: reqwest::Client,
    events: mpsc::UnboundedSender<DeviceEvent>,
}

impl StreamProbe {
    /// Returns the device and the receiver of its notifications, which must
    /// be forwarded to the player
    pub fn new() -> Result<(Self, mpsc::UnboundedReceiver<DeviceEvent>), reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        let state = Arc::new(Mutex::new(ProbeState {
            paused: true,
            ..ProbeState::default()
        }));
        let (events, rx) = mpsc::unbounded_channel();

        Ok((Self { state, http, events }, rx))
    }

    fn emit(&self, event: DeviceEvent) {
        let _ = self.events.send(event);
    }
}

impl AudioOutput for StreamProbe {
    fn assign_source(&mut self, url: &str) {
        let generation = {
            let mut s = self.state.lock();
            s.source = Some(url.to_string());
            s.paused = true;
            s.ended = false;
            s.base_secs = 0.0;
            s.anchor = None;
            s.generation += 1;
            s.generation
        };

        let http = self.http.clone();
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let url = url.to_string();

        tokio::spawn(async move {
            let result = http
                .get(&url)
                .header(reqwest::header::RANGE, format!("bytes=0-{}", PROBE_BYTES - 1))
                .send()
                .await
                .and_then(|resp| resp.error_for_status());

            match result {
                Ok(resp) => {
                    let bytes = resp.bytes().await.map(|b| b.len()).unwrap_or(0);
                    if state.lock().generation != generation {
                        return;
                    }
                    debug!("Probed {} bytes of stream", bytes);
                    let _ = events.send(DeviceEvent::Ready);
                }
                Err(e) => warn!("Stream probe failed: {}", e),
            }
        });
    }

    fn play(&mut self) -> PlayOutcome {
        {
            let mut s = self.state.lock();
            if s.source.is_none() {
                return PlayOutcome::Blocked("no source".to_string());
            }
            if s.anchor.is_none() {
                s.anchor = Some(Instant::now());
            }
            s.paused = false;
        }
        self.emit(DeviceEvent::Playing);
        PlayOutcome::Started
    }

    fn pause(&mut self) {
        {
            let mut s = self.state.lock();
            s.base_secs = s.position();
            s.anchor = None;
            s.paused = true;
        }
        self.emit(DeviceEvent::Paused);
    }

    fn position(&self) -> f64 {
        self.state.lock().position()
    }

    fn set_position(&mut self, seconds: f64) {
        let mut s = self.state.lock();
        s.base_secs = seconds.max(0.0);
        if s.anchor.is_some() {
            s.anchor = Some(Instant::now());
        }
    }

    fn duration(&self) -> Option<f64> {
        None
    }

    fn set_volume(&mut self, volume: f32) {
        // Nothing is audible; only note it
        debug!("Probe volume set to {:.2}", volume);
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn is_ended(&self) -> bool {
        self.state.lock().ended
    }

    fn has_source(&self) -> bool {
        self.state.lock().source.is_some()
    }
}
