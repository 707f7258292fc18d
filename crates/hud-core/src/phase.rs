//! Remediation phase controller
//!
//! Deadline FSM over [`RemediationPhase`]:
//!
//! ```text
//! IDLE -> HOLD -> FAILSAFE -> EXECUTING -> IDLE
//!   \------------------------^   (pre-emptive commit / hold bypass)
//! ```
//!
//! Remaining time is always recomputed from the armed deadline, never
//! decremented, so delayed or missed ticks cannot stretch the countdown.
//! The fail-safe deadline extends from the hold deadline rather than the
//! observing tick; the end-to-end bound (hold + grace) stays exact even
//! when the tick that notices hold expiry arrives late.
//!
//! `tick` emits at most one event per call: a late observer sees
//! `EnteredFailsafe` first and `FailsafeExpired` on the following tick.

use crate::config::SentinelConfig;
use crate::error::PhaseError;
use crate::types::RemediationPhase;
use std::time::{Duration, Instant};

/// Phases reachable from `from` in one legal transition.
#[must_use]
pub fn allowed_transitions(from: RemediationPhase) -> Vec<RemediationPhase> {
    use RemediationPhase::{Executing, Failsafe, Hold, Idle};
    match from {
        Idle => vec![Hold, Executing],
        Hold => vec![Failsafe, Executing, Idle],
        Failsafe => vec![Executing, Idle],
        Executing => vec![Idle],
    }
}

/// Validate a lifecycle transition against the matrix.
///
/// # Errors
/// Returns [`PhaseError::InvalidTransition`] when the edge is not legal.
pub fn validate_transition(from: RemediationPhase, to: RemediationPhase) -> Result<(), PhaseError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(PhaseError::InvalidTransition { from, to })
    }
}

fn allowed(from: RemediationPhase, to: RemediationPhase) -> bool {
    allowed_transitions(from).into_iter().any(|p| p == to)
}

/// Event reported by [`PhaseController::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Forensic hold lapsed without a human decision; grace window armed
    EnteredFailsafe,
    /// Grace window lapsed; sentinel must act autonomously
    FailsafeExpired,
}

/// Owns the countdown for one incident at a time.
#[derive(Debug, Clone)]
pub struct PhaseController {
    phase: RemediationPhase,
    hold: Duration,
    failsafe: Duration,
    deadline: Option<Instant>,
    armed_at: Option<Instant>,
    expiry_emitted: bool,
}

impl PhaseController {
    /// Build a controller with explicit windows.
    #[must_use]
    pub fn new(hold: Duration, failsafe: Duration) -> Self {
        Self {
            phase: RemediationPhase::Idle,
            hold,
            failsafe,
            deadline: None,
            armed_at: None,
            expiry_emitted: false,
        }
    }

    /// Build a controller from the sentinel config.
    #[must_use]
    pub fn from_config(config: &SentinelConfig) -> Self {
        Self::new(config.hold(), config.failsafe())
    }

    /// Current phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> RemediationPhase {
        self.phase
    }

    /// A countdown is running (hold or fail-safe).
    #[inline]
    #[must_use]
    pub fn is_armed(&self) -> bool {
        matches!(self.phase, RemediationPhase::Hold | RemediationPhase::Failsafe)
    }

    /// Remediation is in flight; countdown frozen.
    #[inline]
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.phase == RemediationPhase::Executing
    }

    /// Arm the forensic hold. No-op (returns `false`) unless idle: an
    /// armed countdown is never restarted and an in-flight remediation is
    /// never interrupted by a new arm.
    pub fn arm(&mut self, now: Instant) -> bool {
        if self.phase != RemediationPhase::Idle {
            tracing::debug!(phase = %self.phase, "arm ignored, controller not idle");
            return false;
        }
        self.phase = RemediationPhase::Hold;
        self.deadline = Some(now + self.hold);
        self.armed_at = Some(now);
        self.expiry_emitted = false;
        tracing::info!(hold_secs = self.hold.as_secs(), "forensic hold armed");
        true
    }

    /// Advance the countdown to `now`.
    pub fn tick(&mut self, now: Instant) -> Option<PhaseEvent> {
        match self.phase {
            RemediationPhase::Hold => {
                let deadline = self.deadline?;
                if now >= deadline {
                    self.phase = RemediationPhase::Failsafe;
                    self.deadline = Some(deadline + self.failsafe);
                    tracing::warn!(
                        grace_secs = self.failsafe.as_secs(),
                        "forensic hold lapsed with no human decision, fail-safe armed"
                    );
                    return Some(PhaseEvent::EnteredFailsafe);
                }
                None
            }
            RemediationPhase::Failsafe => {
                let deadline = self.deadline?;
                if now >= deadline && !self.expiry_emitted {
                    self.expiry_emitted = true;
                    tracing::warn!("fail-safe grace lapsed, autonomous remediation required");
                    return Some(PhaseEvent::FailsafeExpired);
                }
                None
            }
            RemediationPhase::Idle | RemediationPhase::Executing => None,
        }
    }

    /// Time left in the current countdown, zero-floored. `None` when no
    /// countdown is armed.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        if !self.is_armed() {
            return None;
        }
        self.deadline.map(|d| d.saturating_duration_since(now))
    }

    /// Time since the hold was armed.
    #[must_use]
    pub fn hold_elapsed(&self, now: Instant) -> Option<Duration> {
        self.armed_at.map(|t| now.duration_since(t))
    }

    /// Freeze the countdown and enter `Executing`.
    ///
    /// # Errors
    /// Returns [`PhaseError::InvalidTransition`] when already executing.
    pub fn begin_execution(&mut self) -> Result<(), PhaseError> {
        validate_transition(self.phase, RemediationPhase::Executing)?;
        tracing::info!(from = %self.phase, "countdown frozen, remediation in flight");
        self.phase = RemediationPhase::Executing;
        self.deadline = None;
        self.expiry_emitted = false;
        Ok(())
    }

    /// Return to idle, dropping any countdown (recovery, completion).
    pub fn disarm(&mut self) {
        if self.phase != RemediationPhase::Idle {
            tracing::debug!(from = %self.phase, "phase controller disarmed");
        }
        self.phase = RemediationPhase::Idle;
        self.deadline = None;
        self.armed_at = None;
        self.expiry_emitted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOLD: Duration = Duration::from_secs(180);
    const GRACE: Duration = Duration::from_secs(120);

    fn controller() -> PhaseController {
        PhaseController::new(HOLD, GRACE)
    }

    #[test]
    fn arm_starts_hold_with_full_window() {
        let mut c = controller();
        let t0 = Instant::now();
        assert!(c.arm(t0));
        assert_eq!(c.phase(), RemediationPhase::Hold);
        assert_eq!(c.remaining(t0), Some(HOLD));
        assert_eq!(c.remaining(t0 + Duration::from_secs(30)), Some(Duration::from_secs(150)));
    }

    #[test]
    fn double_arm_is_ignored() {
        let mut c = controller();
        let t0 = Instant::now();
        assert!(c.arm(t0));
        assert!(!c.arm(t0 + Duration::from_secs(5)));
        // Original deadline unchanged.
        assert_eq!(c.remaining(t0), Some(HOLD));
    }

    #[test]
    fn hold_expiry_enters_failsafe_exactly_once() {
        let mut c = controller();
        let t0 = Instant::now();
        c.arm(t0);
        assert_eq!(c.tick(t0 + Duration::from_secs(179)), None);
        assert_eq!(c.tick(t0 + HOLD), Some(PhaseEvent::EnteredFailsafe));
        assert_eq!(c.phase(), RemediationPhase::Failsafe);
        assert_eq!(c.tick(t0 + HOLD + Duration::from_secs(1)), None);
    }

    #[test]
    fn failsafe_deadline_extends_from_hold_deadline() {
        let mut c = controller();
        let t0 = Instant::now();
        c.arm(t0);
        // Tick arrives 70s late; the grace window must not stretch.
        let late = t0 + HOLD + Duration::from_secs(70);
        assert_eq!(c.tick(late), Some(PhaseEvent::EnteredFailsafe));
        assert_eq!(c.remaining(late), Some(Duration::from_secs(50)));
    }

    #[test]
    fn failsafe_expiry_fires_exactly_once() {
        let mut c = controller();
        let t0 = Instant::now();
        c.arm(t0);
        c.tick(t0 + HOLD);
        let expiry = t0 + HOLD + GRACE;
        assert_eq!(c.tick(expiry), Some(PhaseEvent::FailsafeExpired));
        assert_eq!(c.tick(expiry + Duration::from_secs(1)), None);
        assert_eq!(c.tick(expiry + Duration::from_secs(60)), None);
    }

    #[test]
    fn total_budget_holds_across_missed_ticks() {
        let mut c = controller();
        let t0 = Instant::now();
        c.arm(t0);
        // First tick observed only after the entire budget elapsed.
        let very_late = t0 + HOLD + GRACE + Duration::from_secs(9);
        assert_eq!(c.tick(very_late), Some(PhaseEvent::EnteredFailsafe));
        assert_eq!(c.remaining(very_late), Some(Duration::ZERO));
        assert_eq!(c.tick(very_late), Some(PhaseEvent::FailsafeExpired));
    }

    #[test]
    fn begin_execution_freezes_countdown() {
        let mut c = controller();
        let t0 = Instant::now();
        c.arm(t0);
        c.begin_execution().unwrap();
        assert!(c.is_executing());
        assert_eq!(c.remaining(t0 + Duration::from_secs(500)), None);
        assert_eq!(c.tick(t0 + Duration::from_secs(500)), None);
    }

    #[test]
    fn begin_execution_from_idle_supports_preemptive_commit() {
        let mut c = controller();
        assert!(c.begin_execution().is_ok());
        assert!(c.is_executing());
    }

    #[test]
    fn reentrant_execution_is_rejected() {
        let mut c = controller();
        c.begin_execution().unwrap();
        assert!(matches!(
            c.begin_execution(),
            Err(PhaseError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn disarm_returns_to_idle_from_any_phase() {
        let mut c = controller();
        let t0 = Instant::now();
        c.arm(t0);
        c.tick(t0 + HOLD);
        assert_eq!(c.phase(), RemediationPhase::Failsafe);
        c.disarm();
        assert_eq!(c.phase(), RemediationPhase::Idle);
        assert_eq!(c.remaining(t0), None);
        // A fresh arm runs a fresh full window.
        assert!(c.arm(t0 + Duration::from_secs(400)));
        assert_eq!(c.remaining(t0 + Duration::from_secs(400)), Some(HOLD));
    }

    #[test]
    fn transition_matrix_rejects_backward_edges() {
        use RemediationPhase::{Executing, Failsafe, Hold, Idle};
        assert!(validate_transition(Failsafe, Hold).is_err());
        assert!(validate_transition(Executing, Hold).is_err());
        assert!(validate_transition(Executing, Failsafe).is_err());
        assert!(validate_transition(Idle, Failsafe).is_err());
        assert!(validate_transition(Hold, Failsafe).is_ok());
        assert!(validate_transition(Executing, Idle).is_ok());
    }
}
