//! Liveness watchdog for the feedback feed

use super::protocol::PlaybackFeedback;

/// Detects a feed that went silent while the last known state was "playing".
#[derive(Debug)]
pub struct LivenessWatchdog {
    timeout_ms: u64,
    last_feedback_ms: u64,
    playing: bool,
}

impl LivenessWatchdog {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            last_feedback_ms: 0,
            playing: false,
        }
    }

    /// Record a feedback message received at `now_ms`
    pub fn observe(&mut self, feedback: &PlaybackFeedback, now_ms: u64) {
        self.playing = feedback.is_playing;
        self.last_feedback_ms = now_ms;
    }

    /// Returns true exactly once when the feed has gone stale. The caller is
    /// expected to synthesize a "not playing" feedback.
    pub fn check(&mut self, now_ms: u64) -> bool {
        if self.playing && now_ms.saturating_sub(self.last_feedback_ms) > self.timeout_ms {
            self.playing = false;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing() -> PlaybackFeedback {
        PlaybackFeedback {
            is_playing: true,
            track_id: "A".to_string(),
            server_wall_clock_ms: 0.0,
            server_elapsed_secs: 0.0,
        }
    }

    #[test]
    fn test_never_fires_when_not_playing() {
        let mut watchdog = LivenessWatchdog::new(12_000);
        assert!(!watchdog.check(1_000_000));

        watchdog.observe(&PlaybackFeedback::stopped(), 1000);
        assert!(!watchdog.check(60_000));
    }

    #[test]
    fn test_fires_after_timeout() {
        let mut watchdog = LivenessWatchdog::new(12_000);
        watchdog.observe(&playing(), 1000);

        assert!(!watchdog.check(13_000)); // exactly 12s: not yet
        assert!(watchdog.check(13_001));
    }

    #[test]
    fn test_fires_only_once() {
        let mut watchdog = LivenessWatchdog::new(12_000);
        watchdog.observe(&playing(), 0);

        assert!(watchdog.check(20_000));
        assert!(!watchdog.check(30_000));
    }

    #[test]
    fn test_fresh_feedback_rearms() {
        let mut watchdog = LivenessWatchdog::new(12_000);
        watchdog.observe(&playing(), 0);
        watchdog.observe(&playing(), 10_000);

        assert!(!watchdog.check(20_000));
        assert!(watchdog.check(22_001));
    }
}
