//! Load latency tracking and preload scheduling
//!
//! Measures how long "assign stream URL → device ready" takes and uses a
//! short trailing average to decide how far ahead of the authoritative start
//! instant a track has to be prepared.

use std::collections::VecDeque;
use std::time::Duration;

use crate::config::SyncConfig;

/// Number of load samples to keep for averaging
const LOAD_SAMPLE_COUNT: usize = 5;

/// Assumed load time when no measurements exist
const DEFAULT_LOADING_TIME_MS: f64 = 2000.0;

/// Preparation never starts closer than this to the start instant
const MIN_PRELOAD_LEAD_MS: f64 = 500.0;

/// Rolling window of load durations
#[derive(Debug)]
struct LoadLatency {
    /// Recent load durations in milliseconds, oldest first
    samples: VecDeque<u64>,
    capacity: usize,
    default_ms: f64,
    /// Cached window average
    avg_loading_ms: f64,
}

impl LoadLatency {
    fn new(capacity: usize, default_ms: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            default_ms,
            avg_loading_ms: default_ms,
        }
    }

    fn add_sample(&mut self, load_ms: u64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(load_ms);
        self.recalculate_average();
    }

    fn recalculate_average(&mut self) {
        if self.samples.is_empty() {
            self.avg_loading_ms = self.default_ms;
            return;
        }
        let sum: u64 = self.samples.iter().sum();
        self.avg_loading_ms = sum as f64 / self.samples.len() as f64;
    }
}

/// When to start preparing a track
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PreloadPlan {
    /// Already inside the lead window (or late): prepare now
    Immediate,
    /// Prepare after this delay
    Deferred(Duration),
}

/// Decides when preparation starts and learns from how long it took
#[derive(Debug)]
pub struct PreloadScheduler {
    latency: LoadLatency,
    floor_ms: f64,
    /// When the current stream URL was handed to the device
    assigned_at_ms: Option<u64>,
}

impl PreloadScheduler {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            latency: LoadLatency::new(config.latency_window, config.default_load_ms),
            floor_ms: config.preload_floor_ms,
            assigned_at_ms: None,
        }
    }

    /// Mean of the sample window, or the default before any sample
    pub fn average_loading_ms(&self) -> f64 {
        self.latency.avg_loading_ms
    }

    /// How far ahead of the start instant preparation begins
    pub fn preload_lead_ms(&self) -> f64 {
        self.latency.avg_loading_ms.max(self.floor_ms)
    }

    /// Current samples, oldest first
    pub fn samples(&self) -> Vec<u64> {
        self.latency.samples.iter().copied().collect()
    }

    pub fn record_sample(&mut self, load_ms: u64) {
        self.latency.add_sample(load_ms);
        tracing::debug!(
            "Load latency: sample={}ms, avg={:.0}ms, lead={:.0}ms",
            load_ms,
            self.latency.avg_loading_ms,
            self.preload_lead_ms()
        );
    }

    /// Plan preparation for a track that should start at `start_ms`
    pub fn plan(&self, start_ms: f64, now_ms: u64) -> PreloadPlan {
        let target_ms = start_ms - self.preload_lead_ms();
        let now_ms = now_ms as f64;

        if now_ms < target_ms {
            PreloadPlan::Deferred(Duration::from_millis((target_ms - now_ms).ceil() as u64))
        } else {
            PreloadPlan::Immediate
        }
    }

    /// A new stream URL was handed to the device
    pub fn mark_assigned(&mut self, now_ms: u64) {
        self.assigned_at_ms = Some(now_ms);
    }

    /// The device reported ready. Records and returns the load duration if an
    /// assignment was pending; later ready signals for the same source are ignored.
    pub fn mark_ready(&mut self, now_ms: u64) -> Option<u64> {
        let assigned_at = self.assigned_at_ms.take()?;
        let load_ms = now_ms.saturating_sub(assigned_at);
        self.record_sample(load_ms);
        Some(load_ms)
    }

    /// Forget a pending measurement (source abandoned before ready)
    pub fn cancel_measurement(&mut self) {
        self.assigned_at_ms = None;
    }
}

impl Default for PreloadScheduler {
    fn default() -> Self {
        Self {
            latency: LoadLatency::new(LOAD_SAMPLE_COUNT, DEFAULT_LOADING_TIME_MS),
            floor_ms: MIN_PRELOAD_LEAD_MS,
            assigned_at_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_before_samples() {
        let scheduler = PreloadScheduler::default();
        assert_eq!(scheduler.average_loading_ms(), DEFAULT_LOADING_TIME_MS);
        assert_eq!(scheduler.preload_lead_ms(), DEFAULT_LOADING_TIME_MS);
    }

    #[test]
    fn test_averaging() {
        let mut scheduler = PreloadScheduler::default();
        scheduler.record_sample(1000);
        scheduler.record_sample(3000);

        assert_eq!(scheduler.average_loading_ms(), 2000.0);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut scheduler = PreloadScheduler::default();
        for sample in [100, 200, 300, 400, 500] {
            scheduler.record_sample(sample);
        }
        assert_eq!(scheduler.average_loading_ms(), 300.0);

        scheduler.record_sample(1100);
        assert_eq!(scheduler.samples(), vec![200, 300, 400, 500, 1100]);
        assert_eq!(scheduler.average_loading_ms(), 500.0);

        for sample in 0..20 {
            scheduler.record_sample(sample);
            assert!(scheduler.samples().len() <= LOAD_SAMPLE_COUNT);
        }
    }

    #[test]
    fn test_lead_is_floored() {
        let mut scheduler = PreloadScheduler::default();
        for _ in 0..5 {
            scheduler.record_sample(0);
        }
        assert_eq!(scheduler.average_loading_ms(), 0.0);
        assert_eq!(scheduler.preload_lead_ms(), MIN_PRELOAD_LEAD_MS);

        let zero_default = PreloadScheduler::new(&SyncConfig {
            default_load_ms: 0.0,
            ..SyncConfig::default()
        });
        assert_eq!(zero_default.preload_lead_ms(), MIN_PRELOAD_LEAD_MS);
    }

    #[test]
    fn test_plan_deferred_and_immediate() {
        let scheduler = PreloadScheduler::default(); // lead = 2000ms

        // Start 10s in the future: prepare in 8s
        assert_eq!(
            scheduler.plan(20_000.0, 10_000),
            PreloadPlan::Deferred(Duration::from_millis(8000))
        );

        // Exactly at the target: prepare now
        assert_eq!(scheduler.plan(12_000.0, 10_000), PreloadPlan::Immediate);

        // Start already in the past: late, prepare now
        assert_eq!(scheduler.plan(1_000.0, 10_000), PreloadPlan::Immediate);
    }

    #[test]
    fn test_ready_measurement() {
        let mut scheduler = PreloadScheduler::default();

        // Ready without assignment records nothing
        assert_eq!(scheduler.mark_ready(5000), None);

        scheduler.mark_assigned(1000);
        assert_eq!(scheduler.mark_ready(1800), Some(800));
        assert_eq!(scheduler.samples(), vec![800]);

        // Second ready for the same source is not a new sample
        assert_eq!(scheduler.mark_ready(2500), None);
        assert_eq!(scheduler.samples(), vec![800]);
    }
}
