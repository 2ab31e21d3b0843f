//! Playback synchronization
//!
//! The state machine that keeps the output device on the server's timeline.

mod engine;
mod events;
mod state;

pub use engine::Synchronizer;
pub use events::{Effect, PlayerEvent};
pub use state::{PlaybackIdentity, PlayerSnapshot, SyncPhase};
