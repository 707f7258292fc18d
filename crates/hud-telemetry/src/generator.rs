//! Seeded signal generator
//!
//! Produces the four telemetry regimes the sentinel is exercised against.
//! Each regime is a small random walk with the envelope the detector
//! heuristics are calibrated for:
//!
//! - `Nominal` - healthy baseline, cpu ~40-60%, ram ~30-35%
//! - `Zombie` - kernel fracture: cpu collapses under 2%, ram climbs to 99%
//! - `RemotePulse` - injected adversary strike with frozen thread count
//! - `CpuStrike` - saturation attack: cpu pinned above 95%
//!
//! The walk is driven by a seeded [`StdRng`] so identical seeds replay
//! identical traces.

use crate::{logs, TelemetrySample};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Telemetry regime currently being fabricated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalPattern {
    /// Healthy baseline walk
    Nominal,
    /// Zombie-kernel fracture: starved cpu, climbing ram
    Zombie,
    /// Remote adversary pulse: exact zombie vitals, frozen threads
    RemotePulse,
    /// CPU saturation strike
    CpuStrike,
}

impl SignalPattern {
    /// Short uppercase label used in log lines.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Nominal => "NOMINAL",
            Self::Zombie => "ZOMBIE",
            Self::RemotePulse => "REMOTE_PULSE",
            Self::CpuStrike => "CPU_STRIKE",
        }
    }
}

/// Deterministic telemetry fabricator.
///
/// Holds the previous sample so regimes that walk relative to history
/// (zombie ram climb, frozen thread counts) have a reference point.
#[derive(Debug)]
pub struct SignalGenerator {
    pattern: SignalPattern,
    rng: StdRng,
    last: Option<TelemetrySample>,
}

impl SignalGenerator {
    /// Create a generator in the nominal regime.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_pattern(seed, SignalPattern::Nominal)
    }

    /// Create a generator starting in `pattern`.
    #[must_use]
    pub fn with_pattern(seed: u64, pattern: SignalPattern) -> Self {
        Self {
            pattern,
            rng: StdRng::seed_from_u64(seed),
            last: None,
        }
    }

    /// Current regime.
    #[inline]
    #[must_use]
    pub fn pattern(&self) -> SignalPattern {
        self.pattern
    }

    /// Switch regimes; takes effect on the next sample.
    pub fn set_pattern(&mut self, pattern: SignalPattern) {
        if pattern != self.pattern {
            tracing::debug!(from = self.pattern.label(), to = pattern.label(), "signal pattern switched");
            self.pattern = pattern;
        }
    }

    /// Fabricate the next sample at `at`.
    pub fn next_sample(&mut self, at: DateTime<Utc>) -> TelemetrySample {
        let prev_ram = self.last.as_ref().map_or(32.0, |s| s.ram);
        let prev_threads = self.last.as_ref().map_or(150, |s| s.threads);

        let sample = match self.pattern {
            SignalPattern::Nominal => TelemetrySample::new(
                at,
                40.0 + self.rng.gen::<f64>() * 20.0,
                30.0 + self.rng.gen::<f64>() * 5.0,
                145 + self.rng.gen_range(0..10),
                2.0 + self.rng.gen::<f64>() * 5.0,
            ),
            SignalPattern::Zombie => TelemetrySample::new(
                at,
                self.rng.gen::<f64>() * 2.0,
                (prev_ram + 2.0).min(99.0),
                prev_threads + 5,
                0.5,
            ),
            SignalPattern::RemotePulse => {
                TelemetrySample::new(at, 0.01, 98.0, prev_threads, 0.0)
            }
            SignalPattern::CpuStrike => TelemetrySample::new(
                at,
                95.0 + self.rng.gen::<f64>() * 5.0,
                50.0 + self.rng.gen::<f64>() * 10.0,
                300 + self.rng.gen_range(0..20),
                8.0 + self.rng.gen::<f64>() * 4.0,
            ),
        };

        self.last = Some(sample.clone());
        sample
    }

    /// Fabricate `count` nominal warm-up samples ending just before `end`,
    /// spaced `interval_ms` apart. Used to pre-populate the history ring so
    /// the console never starts with an empty chart.
    pub fn backfill(&mut self, count: usize, end: DateTime<Utc>, interval_ms: i64) -> Vec<TelemetrySample> {
        (0..count)
            .map(|i| {
                let offset = (count - i) as i64 * interval_ms;
                let at = end - ChronoDuration::milliseconds(offset);
                let sample =
                    TelemetrySample::new(at, 45.0 + self.rng.gen::<f64>() * 10.0, 30.0 + self.rng.gen::<f64>() * 5.0, 150, 2.0);
                self.last = Some(sample.clone());
                sample
            })
            .collect()
    }

    /// Fabricate a kernel log line consistent with the current regime.
    pub fn next_log_line(&mut self) -> &'static str {
        let pool = logs::line_pool(self.pattern);
        pool[self.rng.gen_range(0..pool.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn nominal_walk_stays_in_envelope() {
        let mut g = SignalGenerator::new(7);
        for _ in 0..200 {
            let s = g.next_sample(at());
            assert!((40.0..60.0).contains(&s.cpu), "cpu {}", s.cpu);
            assert!((30.0..35.0).contains(&s.ram), "ram {}", s.ram);
            assert!((145..155).contains(&s.threads));
            assert!((2.0..7.0).contains(&s.io_wait));
        }
    }

    #[test]
    fn zombie_walk_matches_fracture_signature() {
        let mut g = SignalGenerator::new(7);
        g.next_sample(at());
        g.set_pattern(SignalPattern::Zombie);
        let mut last_ram = 0.0;
        let mut last_threads = 0;
        for i in 0..40 {
            let s = g.next_sample(at());
            assert!(s.cpu < 2.0);
            assert!(s.ram >= last_ram, "ram must climb");
            assert!(s.ram <= 99.0);
            if i > 0 {
                assert_eq!(s.threads, last_threads + 5);
            }
            last_ram = s.ram;
            last_threads = s.threads;
        }
        // Sustained zombie walks saturate the detector thresholds.
        assert!(last_ram > 90.0);
    }

    #[test]
    fn remote_pulse_is_exact_and_frozen() {
        let mut g = SignalGenerator::new(3);
        let before = g.next_sample(at());
        g.set_pattern(SignalPattern::RemotePulse);
        let s = g.next_sample(at());
        assert_eq!(s.cpu, 0.01);
        assert_eq!(s.ram, 98.0);
        assert_eq!(s.threads, before.threads);
        assert_eq!(s.io_wait, 0.0);
    }

    #[test]
    fn cpu_strike_saturates() {
        let mut g = SignalGenerator::with_pattern(11, SignalPattern::CpuStrike);
        for _ in 0..50 {
            let s = g.next_sample(at());
            assert!(s.cpu >= 95.0);
            assert!((50.0..60.0).contains(&s.ram));
            assert!(s.threads >= 300);
        }
    }

    #[test]
    fn identical_seeds_replay_identical_traces() {
        let mut a = SignalGenerator::new(42);
        let mut b = SignalGenerator::new(42);
        let ts = at();
        for _ in 0..32 {
            assert_eq!(a.next_sample(ts), b.next_sample(ts));
        }
    }

    #[test]
    fn backfill_produces_ordered_warmup() {
        let mut g = SignalGenerator::new(1);
        let end = at();
        let warmup = g.backfill(20, end, 1000);
        assert_eq!(warmup.len(), 20);
        for pair in warmup.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
        for s in &warmup {
            assert!((45.0..55.0).contains(&s.cpu));
            assert_eq!(s.threads, 150);
            assert_eq!(s.io_wait, 2.0);
        }
        assert!(warmup.last().map_or(false, |s| s.timestamp < end));
    }
}
