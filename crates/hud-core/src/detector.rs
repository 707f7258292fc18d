//! Heuristic fracture detector
//!
//! Watches the telemetry stream for the zombie-kernel signature (starved
//! cpu, saturated ram) and reports edges:
//!
//! - `FractureConfirmed` - signature persisted for the confirmation window
//!   while no incident was active. Fires exactly once per incident.
//! - `SelfHealTrigger` - signature persists past confirmation on an active
//!   incident. Fires every tick; the cooldown governor and in-flight guard
//!   downstream decide whether anything happens.
//! - `Recovered` - an active incident's telemetry returned to the recovery
//!   envelope. The incident clears silently: no executor run, no audit
//!   row.
//!
//! The detector never looks at the clock; it counts ticks.

use crate::config::{SentinelConfig, Thresholds};
use hud_telemetry::TelemetrySample;

/// Edge reported by [`FractureDetector::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorEdge {
    /// Signature held for the confirmation window; incident begins
    FractureConfirmed,
    /// Signature persists on an active incident; self-heal candidate
    SelfHealTrigger,
    /// Active incident returned to the recovery envelope
    Recovered,
}

/// Consecutive-signature detector.
#[derive(Debug, Clone)]
pub struct FractureDetector {
    thresholds: Thresholds,
    confirmation_ticks: u32,
    consecutive_bad: u32,
}

impl FractureDetector {
    /// Build a detector with explicit thresholds.
    #[must_use]
    pub fn new(thresholds: Thresholds, confirmation_ticks: u32) -> Self {
        Self {
            thresholds,
            confirmation_ticks: confirmation_ticks.max(1),
            consecutive_bad: 0,
        }
    }

    /// Build a detector from the sentinel config.
    #[must_use]
    pub fn from_config(config: &SentinelConfig) -> Self {
        Self::new(config.thresholds.clone(), config.confirmation_ticks)
    }

    /// Zombie-kernel signature: starved cpu with saturated ram.
    #[must_use]
    pub fn zombie_signature(&self, sample: &TelemetrySample) -> bool {
        sample.cpu < self.thresholds.zombie_cpu && sample.ram > self.thresholds.zombie_ram
    }

    /// Deep-zombie variant used by the classifier heuristic.
    #[must_use]
    pub fn deep_zombie_signature(&self, sample: &TelemetrySample) -> bool {
        sample.cpu < self.thresholds.deep_zombie_cpu && sample.ram > self.thresholds.deep_zombie_ram
    }

    /// Saturation-strike signature.
    #[must_use]
    pub fn strike_signature(&self, sample: &TelemetrySample) -> bool {
        sample.cpu > self.thresholds.strike_cpu
    }

    /// Recovery envelope: cpu restored, ram released.
    #[must_use]
    pub fn recovery_signature(&self, sample: &TelemetrySample) -> bool {
        sample.cpu > self.thresholds.recovery_cpu && sample.ram < self.thresholds.recovery_ram
    }

    /// Feed one sample. `active` is whether an incident is currently open.
    pub fn observe(&mut self, sample: &TelemetrySample, active: bool) -> Option<DetectorEdge> {
        if self.zombie_signature(sample) {
            self.consecutive_bad += 1;
            if self.consecutive_bad == self.confirmation_ticks && !active {
                tracing::warn!(
                    cpu = sample.cpu,
                    ram = sample.ram,
                    ticks = self.consecutive_bad,
                    "fracture confirmed"
                );
                return Some(DetectorEdge::FractureConfirmed);
            }
            if self.consecutive_bad > self.confirmation_ticks && active {
                return Some(DetectorEdge::SelfHealTrigger);
            }
            return None;
        }

        if active && self.recovery_signature(sample) {
            self.consecutive_bad = 0;
            tracing::info!(cpu = sample.cpu, ram = sample.ram, "telemetry recovered, incident clears silently");
            return Some(DetectorEdge::Recovered);
        }
        if !active {
            self.consecutive_bad = 0;
        }
        None
    }

    /// Consecutive zombie-signature ticks seen so far.
    #[inline]
    #[must_use]
    pub fn consecutive_bad(&self) -> u32 {
        self.consecutive_bad
    }

    /// Forget accumulated ticks (incident cleared by the executor).
    pub fn reset(&mut self) {
        self.consecutive_bad = 0;
    }
}

/// Edge reported by [`StallMonitor::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallEdge {
    /// Telemetry has been frozen past the stall window
    Entered,
    /// The frozen pattern broke
    Cleared,
}

/// Advisory monitor for frozen telemetry: ram pinned high and not moving
/// usually means the instrumentation pipe stalled, not that the host is
/// healthy. Raises and clears an advisory; never drives remediation.
#[derive(Debug, Clone)]
pub struct StallMonitor {
    ram_floor: f64,
    delta: f64,
    limit: u32,
    last_ram: Option<f64>,
    frozen_ticks: u32,
    stalled: bool,
}

impl StallMonitor {
    /// Build a monitor with explicit limits.
    #[must_use]
    pub fn new(ram_floor: f64, delta: f64, limit: u32) -> Self {
        Self {
            ram_floor,
            delta,
            limit: limit.max(1),
            last_ram: None,
            frozen_ticks: 0,
            stalled: false,
        }
    }

    /// Build a monitor from the sentinel config.
    #[must_use]
    pub fn from_config(config: &SentinelConfig) -> Self {
        let t = &config.thresholds;
        Self::new(t.stall_ram_floor, t.stall_delta, t.stall_ticks)
    }

    /// Feed one sample.
    pub fn observe(&mut self, sample: &TelemetrySample) -> Option<StallEdge> {
        let edge = if let Some(prev) = self.last_ram {
            if (sample.ram - prev).abs() < self.delta && sample.ram > self.ram_floor {
                self.frozen_ticks += 1;
                if self.frozen_ticks > self.limit && !self.stalled {
                    self.stalled = true;
                    tracing::warn!(ram = sample.ram, ticks = self.frozen_ticks, "telemetry stall advisory raised");
                    Some(StallEdge::Entered)
                } else {
                    None
                }
            } else {
                self.frozen_ticks = 0;
                if self.stalled {
                    self.stalled = false;
                    tracing::info!("telemetry stall advisory cleared");
                    Some(StallEdge::Cleared)
                } else {
                    None
                }
            }
        } else {
            None
        };
        self.last_ram = Some(sample.ram);
        edge
    }

    /// Advisory currently raised.
    #[inline]
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(cpu: f64, ram: f64) -> TelemetrySample {
        TelemetrySample::new(Utc::now(), cpu, ram, 150, 2.0)
    }

    fn detector() -> FractureDetector {
        FractureDetector::from_config(&SentinelConfig::default())
    }

    #[test]
    fn confirms_after_exactly_three_consecutive_ticks() {
        let mut d = detector();
        assert_eq!(d.observe(&sample(1.0, 95.0), false), None);
        assert_eq!(d.observe(&sample(1.0, 95.0), false), None);
        assert_eq!(
            d.observe(&sample(1.0, 95.0), false),
            Some(DetectorEdge::FractureConfirmed)
        );
    }

    #[test]
    fn confirmation_fires_once_then_yields_self_heal() {
        let mut d = detector();
        for _ in 0..2 {
            d.observe(&sample(1.0, 95.0), false);
        }
        assert_eq!(d.observe(&sample(1.0, 95.0), false), Some(DetectorEdge::FractureConfirmed));
        // Incident is now active; persistence becomes self-heal pressure.
        assert_eq!(d.observe(&sample(1.0, 96.0), true), Some(DetectorEdge::SelfHealTrigger));
        assert_eq!(d.observe(&sample(1.0, 97.0), true), Some(DetectorEdge::SelfHealTrigger));
    }

    #[test]
    fn flapping_below_confirmation_never_confirms() {
        let mut d = detector();
        for _ in 0..10 {
            assert_eq!(d.observe(&sample(1.0, 95.0), false), None);
            assert_eq!(d.observe(&sample(1.0, 95.0), false), None);
            assert_eq!(d.observe(&sample(50.0, 30.0), false), None);
        }
        assert_eq!(d.consecutive_bad(), 0);
    }

    #[test]
    fn recovery_clears_active_incident_silently() {
        let mut d = detector();
        for _ in 0..3 {
            d.observe(&sample(1.0, 95.0), false);
        }
        assert_eq!(
            d.observe(&sample(45.0, 40.0), true),
            Some(DetectorEdge::Recovered)
        );
        assert_eq!(d.consecutive_bad(), 0);
    }

    #[test]
    fn ambiguous_telemetry_holds_counter_while_active() {
        let mut d = detector();
        for _ in 0..3 {
            d.observe(&sample(1.0, 95.0), false);
        }
        // cpu back up but ram still pinned: neither zombie nor recovery.
        assert_eq!(d.observe(&sample(50.0, 95.0), true), None);
        assert_eq!(d.consecutive_bad(), 3);
    }

    #[test]
    fn strike_signature_does_not_trip_zombie_path() {
        let mut d = detector();
        let strike = sample(97.0, 55.0);
        assert!(d.strike_signature(&strike));
        assert!(!d.zombie_signature(&strike));
        assert_eq!(d.observe(&strike, false), None);
        assert_eq!(d.consecutive_bad(), 0);
    }

    #[test]
    fn stall_advisory_raises_after_limit_and_clears_on_movement() {
        let mut m = StallMonitor::new(50.0, 0.1, 5);
        m.observe(&sample(40.0, 70.0));
        for _ in 0..5 {
            assert_eq!(m.observe(&sample(40.0, 70.0)), None);
        }
        assert_eq!(m.observe(&sample(40.0, 70.0)), Some(StallEdge::Entered));
        assert!(m.is_stalled());
        // Advisory raised once, not per tick.
        assert_eq!(m.observe(&sample(40.0, 70.0)), None);
        assert_eq!(m.observe(&sample(40.0, 75.0)), Some(StallEdge::Cleared));
        assert!(!m.is_stalled());
    }

    #[test]
    fn low_ram_freeze_is_not_a_stall() {
        let mut m = StallMonitor::new(50.0, 0.1, 3);
        m.observe(&sample(40.0, 30.0));
        for _ in 0..20 {
            assert_eq!(m.observe(&sample(40.0, 30.0)), None);
        }
        assert!(!m.is_stalled());
    }
}
