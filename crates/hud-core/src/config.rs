//! Sentinel configuration
//!
//! All tunables for the incident core in one serde-loadable struct.
//! Defaults carry the canonical production calibration; tests shrink the
//! durations instead of mocking clocks.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Detector and classifier signature thresholds (percent units).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Zombie signature: cpu strictly below this
    pub zombie_cpu: f64,
    /// Zombie signature: ram strictly above this
    pub zombie_ram: f64,
    /// Deep-zombie variant: cpu strictly below this
    pub deep_zombie_cpu: f64,
    /// Deep-zombie variant: ram strictly above this
    pub deep_zombie_ram: f64,
    /// Saturation strike: cpu strictly above this
    pub strike_cpu: f64,
    /// Recovery: cpu strictly above this
    pub recovery_cpu: f64,
    /// Recovery: ram strictly below this
    pub recovery_ram: f64,
    /// Classifier zombie heuristic uses a looser ram floor
    pub classifier_zombie_ram: f64,
    /// Stall advisory: ram must sit above this
    pub stall_ram_floor: f64,
    /// Stall advisory: per-tick ram delta below this counts as frozen
    pub stall_delta: f64,
    /// Stall advisory: frozen ticks before raising
    pub stall_ticks: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            zombie_cpu: 5.0,
            zombie_ram: 90.0,
            deep_zombie_cpu: 2.0,
            deep_zombie_ram: 90.0,
            strike_cpu: 90.0,
            recovery_cpu: 20.0,
            recovery_ram: 80.0,
            classifier_zombie_ram: 80.0,
            stall_ram_floor: 50.0,
            stall_delta: 0.1,
            stall_ticks: 60,
        }
    }
}

/// Simulated instance the reset seam targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetTarget {
    /// Cloud project
    pub project: String,
    /// Availability zone
    pub zone: String,
    /// Instance name
    pub instance: String,
}

impl ResetTarget {
    /// Fully qualified resource path, as the reset API addresses it.
    #[must_use]
    pub fn resource_path(&self) -> String {
        format!(
            "projects/{}/zones/{}/instances/{}",
            self.project, self.zone, self.instance
        )
    }
}

impl Default for ResetTarget {
    fn default() -> Self {
        Self {
            project: "king-hud-production".to_string(),
            zone: "us-central1-a".to_string(),
            instance: "gcp-p100-node-04".to_string(),
        }
    }
}

/// Complete sentinel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Telemetry tick cadence, milliseconds
    pub tick_interval_ms: u64,
    /// Samples retained in the history ring
    pub history_points: usize,
    /// Lines retained in the synthetic log window
    pub log_window_lines: usize,
    /// Forensic hold before the fail-safe arms, seconds
    pub hold_secs: u64,
    /// Fail-safe grace before autonomous action, seconds
    pub failsafe_secs: u64,
    /// Governor window after a completed reset, seconds
    pub reset_cooldown_secs: u64,
    /// Quiet period before draining queued strikes, seconds
    pub settle_delay_secs: u64,
    /// Minimum spacing between classifier launches, seconds
    pub classifier_debounce_secs: u64,
    /// Consecutive zombie ticks required to confirm a fracture
    pub confirmation_ticks: u32,
    /// Remote adversary pulse duration, seconds
    pub remote_pulse_secs: u64,
    /// Red-team strike window, seconds
    pub red_team_window_secs: u64,
    /// Delay before a hold-bypassing source actuates, milliseconds
    pub actuation_delay_ms: u64,
    /// Uplink heartbeat retry spacing, seconds
    pub heartbeat_retry_secs: u64,
    /// Drill scheduler check cadence, seconds
    pub scheduler_cadence_secs: u64,
    /// Watch-shift wall clock offset from UTC, hours
    pub shift_utc_offset_hours: i8,
    /// Seed for the telemetry fabricator
    pub sim_seed: u64,
    /// Signature thresholds
    pub thresholds: Thresholds,
    /// Reset target
    pub target: ResetTarget,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            history_points: 60,
            log_window_lines: 200,
            hold_secs: 180,
            failsafe_secs: 120,
            reset_cooldown_secs: 300,
            settle_delay_secs: 10,
            classifier_debounce_secs: 10,
            confirmation_ticks: 3,
            remote_pulse_secs: 5,
            red_team_window_secs: 30,
            actuation_delay_ms: 2000,
            heartbeat_retry_secs: 15,
            scheduler_cadence_secs: 30,
            shift_utc_offset_hours: -6,
            sim_seed: 42,
            thresholds: Thresholds::default(),
            target: ResetTarget::default(),
        }
    }
}

impl SentinelConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if the file is unreadable,
    /// [`ConfigError::Parse`] if it is not valid JSON, or a validation
    /// error if the values are inconsistent.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    ///
    /// # Errors
    /// Returns [`ConfigError`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::NonPositive { field: "tick_interval_ms" });
        }
        if self.history_points == 0 {
            return Err(ConfigError::NonPositive { field: "history_points" });
        }
        if self.hold_secs == 0 {
            return Err(ConfigError::NonPositive { field: "hold_secs" });
        }
        if self.failsafe_secs == 0 {
            return Err(ConfigError::NonPositive { field: "failsafe_secs" });
        }
        if self.confirmation_ticks == 0 {
            return Err(ConfigError::NonPositive { field: "confirmation_ticks" });
        }
        if self.thresholds.stall_ticks == 0 {
            return Err(ConfigError::NonPositive { field: "thresholds.stall_ticks" });
        }
        let t = &self.thresholds;
        if t.recovery_cpu <= t.zombie_cpu {
            return Err(ConfigError::SignatureOverlap {
                detail: format!(
                    "recovery_cpu {} must exceed zombie_cpu {}",
                    t.recovery_cpu, t.zombie_cpu
                ),
            });
        }
        if t.recovery_ram >= t.zombie_ram {
            return Err(ConfigError::SignatureOverlap {
                detail: format!(
                    "recovery_ram {} must sit below zombie_ram {}",
                    t.recovery_ram, t.zombie_ram
                ),
            });
        }
        Ok(())
    }

    /// Set the forensic hold length.
    #[must_use]
    pub fn with_hold_secs(mut self, secs: u64) -> Self {
        self.hold_secs = secs;
        self
    }

    /// Set the fail-safe grace length.
    #[must_use]
    pub fn with_failsafe_secs(mut self, secs: u64) -> Self {
        self.failsafe_secs = secs;
        self
    }

    /// Set the reset cooldown window.
    #[must_use]
    pub fn with_cooldown_secs(mut self, secs: u64) -> Self {
        self.reset_cooldown_secs = secs;
        self
    }

    /// Set the queue settle delay.
    #[must_use]
    pub fn with_settle_delay_secs(mut self, secs: u64) -> Self {
        self.settle_delay_secs = secs;
        self
    }

    /// Set the confirmation tick count.
    #[must_use]
    pub fn with_confirmation_ticks(mut self, ticks: u32) -> Self {
        self.confirmation_ticks = ticks;
        self
    }

    /// Set the fabricator seed.
    #[must_use]
    pub fn with_sim_seed(mut self, seed: u64) -> Self {
        self.sim_seed = seed;
        self
    }

    /// Tick cadence as a [`Duration`].
    #[inline]
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Forensic hold as a [`Duration`].
    #[inline]
    #[must_use]
    pub fn hold(&self) -> Duration {
        Duration::from_secs(self.hold_secs)
    }

    /// Fail-safe grace as a [`Duration`].
    #[inline]
    #[must_use]
    pub fn failsafe(&self) -> Duration {
        Duration::from_secs(self.failsafe_secs)
    }

    /// Reset cooldown as a [`Duration`].
    #[inline]
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.reset_cooldown_secs)
    }

    /// Queue settle delay as a [`Duration`].
    #[inline]
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    /// Classifier debounce as a [`Duration`].
    #[inline]
    #[must_use]
    pub fn classifier_debounce(&self) -> Duration {
        Duration::from_secs(self.classifier_debounce_secs)
    }

    /// Actuation delay as a [`Duration`].
    #[inline]
    #[must_use]
    pub fn actuation_delay(&self) -> Duration {
        Duration::from_millis(self.actuation_delay_ms)
    }

    /// Remote pulse window as a [`Duration`].
    #[inline]
    #[must_use]
    pub fn remote_pulse(&self) -> Duration {
        Duration::from_secs(self.remote_pulse_secs)
    }

    /// Red-team window as a [`Duration`].
    #[inline]
    #[must_use]
    pub fn red_team_window(&self) -> Duration {
        Duration::from_secs(self.red_team_window_secs)
    }

    /// Heartbeat retry spacing as a [`Duration`].
    #[inline]
    #[must_use]
    pub fn heartbeat_retry(&self) -> Duration {
        Duration::from_secs(self.heartbeat_retry_secs)
    }

    /// Scheduler check cadence as a [`Duration`].
    #[inline]
    #[must_use]
    pub fn scheduler_cadence(&self) -> Duration {
        Duration::from_secs(self.scheduler_cadence_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_carry_production_calibration() {
        let cfg = SentinelConfig::default();
        assert_eq!(cfg.hold_secs, 180);
        assert_eq!(cfg.failsafe_secs, 120);
        assert_eq!(cfg.reset_cooldown_secs, 300);
        assert_eq!(cfg.settle_delay_secs, 10);
        assert_eq!(cfg.confirmation_ticks, 3);
        assert_eq!(cfg.target.instance, "gcp-p100-node-04");
        assert_eq!(
            cfg.target.resource_path(),
            "projects/king-hud-production/zones/us-central1-a/instances/gcp-p100-node-04"
        );
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn hold_plus_failsafe_totals_five_minutes() {
        let cfg = SentinelConfig::default();
        assert_eq!(cfg.hold() + cfg.failsafe(), Duration::from_secs(300));
    }

    #[test]
    fn validate_rejects_zero_durations() {
        let cfg = SentinelConfig::default().with_hold_secs(0);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonPositive { field: "hold_secs" })
        ));
    }

    #[test]
    fn validate_rejects_overlapping_signatures() {
        let mut cfg = SentinelConfig::default();
        cfg.thresholds.recovery_cpu = 4.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::SignatureOverlap { .. })
        ));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: SentinelConfig = serde_json::from_str(r#"{"hold_secs": 5}"#).unwrap();
        assert_eq!(cfg.hold_secs, 5);
        assert_eq!(cfg.failsafe_secs, 120);
        assert_eq!(cfg.thresholds.zombie_cpu, 5.0);
    }

    #[test]
    fn builders_chain() {
        let cfg = SentinelConfig::default()
            .with_hold_secs(2)
            .with_failsafe_secs(1)
            .with_cooldown_secs(3)
            .with_settle_delay_secs(1)
            .with_confirmation_ticks(2)
            .with_sim_seed(7);
        assert_eq!(cfg.hold(), Duration::from_secs(2));
        assert_eq!(cfg.failsafe(), Duration::from_secs(1));
        assert_eq!(cfg.sim_seed, 7);
        assert!(cfg.validate().is_ok());
    }
}
