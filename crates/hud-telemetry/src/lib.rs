//! Synthetic telemetry for the KING-HUD sentinel
//!
//! This crate fabricates the signals the incident core consumes:
//! - [`TelemetrySample`] - one instrumentation point (cpu / ram / threads / io)
//! - [`TelemetryRing`] - bounded sliding history, oldest evicted first
//! - [`SignalGenerator`] - seeded random walks per [`SignalPattern`]
//! - [`LogWindow`] - bounded synthetic kernel log feed
//!
//! Everything here is deterministic under a fixed seed so scenario tests can
//! replay exact traces.

pub mod generator;
pub mod logs;

pub use generator::{SignalGenerator, SignalPattern};
pub use logs::LogWindow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of samples retained in the sliding history.
pub const DEFAULT_HISTORY_POINTS: usize = 60;

/// One fabricated instrumentation point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Wall-clock instant the sample was produced
    pub timestamp: DateTime<Utc>,
    /// CPU utilization, percent in `[0, 100]`
    pub cpu: f64,
    /// RAM utilization, percent in `[0, 100]`
    pub ram: f64,
    /// Kernel thread count
    pub threads: u32,
    /// IO wait, percent
    pub io_wait: f64,
}

impl TelemetrySample {
    /// Create a sample, clamping percentages into `[0, 100]`.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, cpu: f64, ram: f64, threads: u32, io_wait: f64) -> Self {
        Self {
            timestamp,
            cpu: clamp_pct(cpu),
            ram: clamp_pct(ram),
            threads,
            io_wait: io_wait.max(0.0),
        }
    }
}

fn clamp_pct(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Bounded sliding window of recent samples.
///
/// Pushing past capacity evicts the oldest sample. Capacity is fixed at
/// construction; `0` is coerced to `1`.
#[derive(Debug, Clone)]
pub struct TelemetryRing {
    samples: VecDeque<TelemetrySample>,
    capacity: usize,
}

impl TelemetryRing {
    /// Create an empty ring holding at most `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn push(&mut self, sample: TelemetrySample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Most recent sample, if any.
    #[inline]
    #[must_use]
    pub fn latest(&self) -> Option<&TelemetrySample> {
        self.samples.back()
    }

    /// Number of retained samples.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no samples have been recorded yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum CPU over the retained window.
    #[must_use]
    pub fn peak_cpu(&self) -> f64 {
        self.samples.iter().map(|s| s.cpu).fold(0.0, f64::max)
    }

    /// Maximum RAM over the retained window.
    #[must_use]
    pub fn peak_ram(&self) -> f64 {
        self.samples.iter().map(|s| s.ram).fold(0.0, f64::max)
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &TelemetrySample> {
        self.samples.iter()
    }
}

impl Default for TelemetryRing {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_POINTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_at(cpu: f64, ram: f64) -> TelemetrySample {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        TelemetrySample::new(ts, cpu, ram, 150, 2.0)
    }

    #[test]
    fn sample_clamps_percentages() {
        let s = sample_at(140.0, -3.0);
        assert_eq!(s.cpu, 100.0);
        assert_eq!(s.ram, 0.0);
    }

    #[test]
    fn ring_evicts_oldest_at_capacity() {
        let mut ring = TelemetryRing::new(3);
        for i in 0..5 {
            ring.push(sample_at(f64::from(i), 30.0));
        }
        assert_eq!(ring.len(), 3);
        let cpus: Vec<f64> = ring.iter().map(|s| s.cpu).collect();
        assert_eq!(cpus, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn ring_tracks_peaks() {
        let mut ring = TelemetryRing::new(10);
        ring.push(sample_at(12.0, 40.0));
        ring.push(sample_at(97.5, 35.0));
        ring.push(sample_at(8.0, 91.0));
        assert_eq!(ring.peak_cpu(), 97.5);
        assert_eq!(ring.peak_ram(), 91.0);
    }

    #[test]
    fn latest_follows_push_order() {
        let mut ring = TelemetryRing::default();
        assert!(ring.latest().is_none());
        ring.push(sample_at(10.0, 20.0));
        ring.push(sample_at(11.0, 21.0));
        assert_eq!(ring.latest().map(|s| s.cpu), Some(11.0));
    }
}
