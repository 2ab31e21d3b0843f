//! Drift correction
//!
//! Compares where the device is with where the authoritative timeline says
//! it should be, and decides whether to force it back.

/// Default allowed deviation before correcting (seconds)
const DEFAULT_THRESHOLD_SECS: f64 = 0.5;

/// Position (seconds) a track started at `start_ms` should be at by `now_ms`
pub fn expected_position_secs(start_ms: f64, now_ms: u64) -> f64 {
    (now_ms as f64 - start_ms) / 1000.0
}

/// Position for the first frame after a switch; never negative
pub fn initial_seek_secs(start_ms: f64, now_ms: u64) -> f64 {
    expected_position_secs(start_ms, now_ms).max(0.0)
}

#[derive(Debug)]
pub struct DriftCorrector {
    threshold_secs: f64,
    corrections: u64,
}

impl DriftCorrector {
    pub fn new(threshold_secs: f64) -> Self {
        Self {
            threshold_secs,
            corrections: 0,
        }
    }

    /// Returns the position to seek to when `|expected - actual|` is strictly
    /// above the threshold, `None` otherwise.
    pub fn check(&mut self, expected_secs: f64, actual_secs: f64) -> Option<f64> {
        let drift = (expected_secs - actual_secs).abs();
        if drift > self.threshold_secs {
            self.corrections += 1;
            tracing::warn!(
                "Drift of {:.2}s detected (expected {:.2}s, actual {:.2}s), resyncing",
                drift,
                expected_secs,
                actual_secs
            );
            Some(expected_secs)
        } else {
            None
        }
    }

    /// Number of corrections applied so far
    pub fn corrections(&self) -> u64 {
        self.corrections
    }
}

impl Default for DriftCorrector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_position() {
        assert_eq!(expected_position_secs(1_700_000_000_000.0, 1_700_000_012_500), 12.5);
        assert_eq!(initial_seek_secs(10_000.0, 9_000), 0.0);
    }

    #[test]
    fn test_within_threshold_is_left_alone() {
        let mut corrector = DriftCorrector::default();
        assert_eq!(corrector.check(10.0, 10.2), None);
        assert_eq!(corrector.check(10.0, 9.8), None);
        assert_eq!(corrector.corrections(), 0);
    }

    #[test]
    fn test_exact_threshold_does_not_correct() {
        let mut corrector = DriftCorrector::default();
        assert_eq!(corrector.check(10.5, 10.0), None);
        assert_eq!(corrector.check(10.0, 10.5), None);
    }

    #[test]
    fn test_beyond_threshold_corrects() {
        let mut corrector = DriftCorrector::default();
        assert_eq!(corrector.check(10.0, 10.75), Some(10.0));
        assert_eq!(corrector.check(20.0, 18.0), Some(20.0));
        assert_eq!(corrector.corrections(), 2);
    }
}
