//! Session Feed
//!
//! WebSocket subscription to a broadcast session's playback feedback.

mod manager;
mod protocol;
mod watchdog;

pub use manager::{ChannelError, ConnectionState, FeedEvent, FeedHandle, FeedManager};
pub use protocol::{parse_feedback, ListenRequest, MalformedMessage, PlaybackFeedback};
pub use watchdog::LivenessWatchdog;
