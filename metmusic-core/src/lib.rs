//! MeTMusic Listen-Along - Core Library
//!
//! Keeps a local audio output aligned with a server-declared "what is playing
//! and since when" state pushed over a WebSocket feed, with reconnect
//! handling, drift correction, latency-driven preloading and per-session
//! resolution caching.

pub mod config;
pub mod drift;
pub mod feed;
pub mod ffi;
pub mod latency;
pub mod notify;
pub mod output;
pub mod player;
pub mod resolve;
pub mod sync;

// Re-exports for convenience
pub use config::{ConfigError, PlayerConfig};
pub use feed::{ConnectionState, PlaybackFeedback};
pub use notify::{ChangeNotifier, DisplayBindings, PlayerChange, PlayerObserver, PlayerStatus};
pub use output::{AudioOutput, DeviceEvent, PlayOutcome};
pub use player::PlayerHandle;
pub use resolve::{ResolvedTrack, TrackMetadata};
pub use sync::{PlayerSnapshot, SyncPhase};

/// Current time in milliseconds since UNIX epoch
pub fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// Setup uniffi scaffolding
uniffi::setup_scaffolding!();
