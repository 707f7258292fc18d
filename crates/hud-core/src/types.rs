//! Core types for the KING-HUD incident system
//!
//! This module defines the identifiers, source tags, lifecycle phases and
//! incident state shared by every component of the sentinel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Unique identifier for one incident / remediation cycle.
///
/// Rendered as a short forensic code (`Z-` + leading uuid bytes) in logs
/// and audit rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncidentId(pub Uuid);

impl IncidentId {
    /// Generate a fresh incident id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short forensic code, e.g. `Z-9F21A4C3`.
    #[must_use]
    pub fn forensic_code(&self) -> String {
        let bytes = self.0.as_bytes();
        format!(
            "Z-{:02X}{:02X}{:02X}{:02X}",
            bytes[0], bytes[1], bytes[2], bytes[3]
        )
    }
}

impl Default for IncidentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.forensic_code())
    }
}

/// Origin of a strike trigger or remediation commit.
///
/// The tag drives three policy decisions: automated sources are
/// cooldown-governed, adversary sources flag the audit row, and
/// hold-bypassing sources skip the forensic countdown entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTag {
    /// Operator pressed the dashboard strike control
    DashboardManual,
    /// Operator committed from the dashboard console
    DashboardConsole,
    /// Red-team exercise, human initiated
    RedTeamManual,
    /// Remote adversary strike injected by an admin context
    AdminRemoteStrike,
    /// Manual commit from the admin console context
    AdminConsoleManual,
    /// Generic automation scheduler
    AutoScheduler,
    /// Fail-safe countdown lapsed; sentinel acted alone
    AutoSentinelFailsafe,
    /// Scheduled sentinel drill
    AutoSentinelScheduled,
    /// Third-shift autonomous remediation
    AutoThirdShift,
    /// Browser/window lifecycle hook
    WindowHook,
    /// Out-of-band blue-team uplink
    BlueTeamOobLink,
    /// Unattributed
    Unknown,
}

impl SourceTag {
    /// Wire name used in signals, logs and audit rows.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DashboardManual => "DASHBOARD_MANUAL",
            Self::DashboardConsole => "DASHBOARD_CONSOLE",
            Self::RedTeamManual => "RED_TEAM_MANUAL",
            Self::AdminRemoteStrike => "ADMIN_REMOTE_STRIKE",
            Self::AdminConsoleManual => "ADMIN_CONSOLE_MANUAL",
            Self::AutoScheduler => "AUTO_SCHEDULER",
            Self::AutoSentinelFailsafe => "AUTO_SENTINEL_FAILSAFE",
            Self::AutoSentinelScheduled => "AUTO_SENTINEL_SCHEDULED",
            Self::AutoThirdShift => "AUTO_REMEDIATION_3RD_SHIFT",
            Self::WindowHook => "WINDOW_HOOK",
            Self::BlueTeamOobLink => "BLUE_TEAM_OOB_LINK",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Automated sources are serialized through the traffic controller and
    /// rejected while the reset cooldown governor is active.
    #[must_use]
    pub fn is_automated(self) -> bool {
        matches!(
            self,
            Self::AutoScheduler
                | Self::AutoSentinelFailsafe
                | Self::AutoSentinelScheduled
                | Self::AutoThirdShift
        )
    }

    /// Adversary-emulation sources mark the audit row.
    #[must_use]
    pub fn is_adversary(self) -> bool {
        matches!(
            self,
            Self::RedTeamManual | Self::AdminRemoteStrike | Self::AdminConsoleManual
        )
    }

    /// Sources that skip the forensic hold and execute autonomously after
    /// the actuation delay (scheduled drills, third-shift autonomy).
    #[must_use]
    pub fn bypasses_hold(self) -> bool {
        matches!(
            self,
            Self::AutoScheduler | Self::AutoSentinelScheduled | Self::AutoThirdShift
        )
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remediation lifecycle.
///
/// A single incident moves `Idle -> Hold -> Failsafe -> Executing -> Idle`;
/// human override jumps from `Hold` or `Failsafe` straight to `Executing`,
/// and silent recovery disarms back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemediationPhase {
    /// No countdown armed
    Idle,
    /// Forensic hold: waiting on a human decision
    Hold,
    /// Grace window before autonomous action
    Failsafe,
    /// Remediation in flight; countdown frozen
    Executing,
}

impl RemediationPhase {
    /// Wire name for logs and snapshots.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Hold => "HOLD",
            Self::Failsafe => "FAILSAFE",
            Self::Executing => "EXECUTING",
        }
    }
}

impl fmt::Display for RemediationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Headline system status shown on the HUD and fed to alert channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemStatus {
    /// Telemetry inside nominal envelope
    Nominal,
    /// Degraded but operating
    Warning,
    /// Severely degraded
    Critical,
    /// Zombie-kernel fracture confirmed
    ZombieKernel,
    /// Detector confirmed a fracture; countdown armed
    FractureDetected,
    /// Scheduled sentinel drill executing
    ScheduledProtocol,
    /// Adversary emulation in progress
    AdversaryEmulation,
    /// Alert uplink hard-failed
    UplinkFailure,
    /// Heartbeat retrying the uplink
    UplinkReconnecting,
    /// Uplink running in simulated-failover mode
    UplinkSimulation,
}

impl SystemStatus {
    /// Wire name for logs, alerts and classifier output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nominal => "NOMINAL",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::ZombieKernel => "ZOMBIE_KERNEL",
            Self::FractureDetected => "FRACTURE_DETECTED",
            Self::ScheduledProtocol => "SCHEDULED_PROTOCOL",
            Self::AdversaryEmulation => "ADVERSARY_EMULATION",
            Self::UplinkFailure => "UPLINK_FAILURE",
            Self::UplinkReconnecting => "UPLINK_RECONNECTING",
            Self::UplinkSimulation => "UPLINK_SIMULATION",
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable incident record owned by the coordinator.
///
/// `detected_at` / `detected_mono` are first-writer-wins for the lifetime of
/// one incident: confirmation stamps them once and later triggers must not
/// move them, otherwise recovery-time accounting lies.
#[derive(Debug, Clone)]
pub struct IncidentState {
    /// An incident is currently active
    pub active: bool,
    /// Identifier of the active incident
    pub id: Option<IncidentId>,
    /// What initiated the active incident
    pub source: Option<SourceTag>,
    /// Wall-clock stamp of confirmation (audit rows)
    pub detected_at: Option<DateTime<Utc>>,
    /// Monotonic stamp of confirmation (duration math)
    pub detected_mono: Option<Instant>,
    /// Consecutive zombie-signature ticks observed by the detector
    pub consecutive_bad_ticks: u32,
    /// Monotonic stamp of the last completed reset (cooldown governor)
    pub last_reset_at: Option<Instant>,
    /// Time the trigger spent queued behind an earlier incident
    pub queue_delay: Duration,
    /// Highest classifier confidence seen during this incident
    pub peak_confidence: u8,
    /// Telemetry stall advisory currently raised
    pub stalled: bool,
}

impl IncidentState {
    /// Fresh, inactive state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: false,
            id: None,
            source: None,
            detected_at: None,
            detected_mono: None,
            consecutive_bad_ticks: 0,
            last_reset_at: None,
            queue_delay: Duration::ZERO,
            peak_confidence: 0,
            stalled: false,
        }
    }

    /// Mark an incident active. The detection stamps are only written by
    /// the first caller; repeat triggers while active keep the originals.
    pub fn begin(&mut self, id: IncidentId, source: SourceTag, wall: DateTime<Utc>, mono: Instant) {
        self.active = true;
        if self.id.is_none() {
            self.id = Some(id);
        }
        if self.source.is_none() {
            self.source = Some(source);
        }
        if self.detected_at.is_none() {
            self.detected_at = Some(wall);
            self.detected_mono = Some(mono);
        }
    }

    /// Clear everything bound to the incident. The cooldown stamp
    /// (`last_reset_at`) survives; it spans incidents.
    pub fn clear(&mut self) {
        self.active = false;
        self.id = None;
        self.source = None;
        self.detected_at = None;
        self.detected_mono = None;
        self.consecutive_bad_ticks = 0;
        self.queue_delay = Duration::ZERO;
        self.peak_confidence = 0;
    }

    /// Latch a classifier confidence score; never lowers the peak while an
    /// incident is active.
    pub fn latch_confidence(&mut self, confidence: u8) {
        if confidence > self.peak_confidence {
            self.peak_confidence = confidence;
        }
    }

    /// Elapsed time since confirmation, if an incident is active.
    #[must_use]
    pub fn elapsed_since_detection(&self, now: Instant) -> Option<Duration> {
        self.detected_mono.map(|t| now.duration_since(t))
    }
}

impl Default for IncidentState {
    fn default() -> Self {
        Self::new()
    }
}

/// One strike request parked behind an active incident.
#[derive(Debug, Clone)]
pub struct StrikeQueueEntry {
    /// Queue entry identifier
    pub id: Uuid,
    /// Who requested the strike
    pub source: SourceTag,
    /// Monotonic stamp at enqueue (queue-delay accounting)
    pub enqueued_at: Instant,
    /// Wall-clock stamp at enqueue
    pub requested_at: DateTime<Utc>,
}

impl StrikeQueueEntry {
    /// Build an entry stamped at `now` / `wall`.
    #[must_use]
    pub fn new(source: SourceTag, now: Instant, wall: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            enqueued_at: now,
            requested_at: wall,
        }
    }
}

/// Point-in-time view of the coordinator for the console and tests.
#[derive(Debug, Clone)]
pub struct HudSnapshot {
    /// Current lifecycle phase
    pub phase: RemediationPhase,
    /// Time left in the current countdown, if one is armed
    pub phase_remaining: Option<Duration>,
    /// Incident currently active
    pub active: bool,
    /// Active incident id
    pub incident: Option<IncidentId>,
    /// Source of the active incident
    pub source: Option<SourceTag>,
    /// Headline status
    pub status: SystemStatus,
    /// Strikes parked in the traffic queue
    pub queue_depth: usize,
    /// Consecutive zombie-signature ticks
    pub consecutive_bad_ticks: u32,
    /// Telemetry stall advisory
    pub stalled: bool,
    /// Peak classifier confidence this incident
    pub peak_confidence: u8,
    /// Remaining reset cooldown, if the governor is active
    pub cooldown_remaining: Option<Duration>,
}
