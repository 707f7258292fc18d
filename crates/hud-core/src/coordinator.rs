//! Incident coordinator
//!
//! Single owner of every piece of mutable incident state: the incident
//! record, detector, stall monitor, phase controller, traffic controller,
//! drill scheduler, confidence latch and forensic journal. All mutation
//! goes through the public operations below; the async runtime serializes
//! calls through one queue, so the core itself stays synchronous and
//! deterministic under test.
//!
//! Operations return [`Action`] directives instead of performing I/O:
//! the runtime launches classifiers, broadcasts alerts, drives the reset
//! seam and switches the telemetry regime, then feeds completions back in
//! (`classifier_completed`, `complete_remediation`). While that I/O is
//! outstanding the detector and countdown keep ticking; the `Executing`
//! phase is the in-flight guard that prevents a second overlapping cycle.

use crate::alert::{AlertMessage, UplinkHealth};
use crate::audit::{
    cognitive_load, AuditLog, AuditRecord, RemediationType, VitalsAtTrigger, REJECTED_TRIGGER_LABEL,
};
use crate::bus::{SignalKind, StrikeBus, StrikeSignal};
use crate::classifier::{confidence_label, Diagnosis, ForensicJournal, ForensicReport};
use crate::config::SentinelConfig;
use crate::detector::{DetectorEdge, FractureDetector, StallEdge, StallMonitor};
use crate::error::{ExecuteError, TriggerError};
use crate::phase::{PhaseController, PhaseEvent};
use crate::shift::{DrillScheduler, WatchShift};
use crate::traffic::{StrikeDisposition, TrafficController};
use crate::types::{
    HudSnapshot, IncidentId, IncidentState, RemediationPhase, SourceTag, SystemStatus,
};
use chrono::{DateTime, Utc};
use hud_telemetry::{SignalPattern, TelemetrySample};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything the runtime needs to run one reset cycle and report back.
#[derive(Debug, Clone)]
pub struct ExecutionTicket {
    /// Incident being remediated
    pub incident: IncidentId,
    /// Source attributed to the action
    pub source: SourceTag,
    /// A human committed this action
    pub manual: bool,
    /// Vitals at the decision sample
    pub vitals: VitalsAtTrigger,
    /// Detection to decision, zero for autonomous runs
    pub human_latency: Duration,
    /// Remediation command carried to the pipeline bridge
    pub command: String,
    /// Actuation delay before the reset is issued
    pub delay: Duration,
}

/// I/O directive returned by coordinator operations.
#[derive(Debug, Clone)]
pub enum Action {
    /// Run the classifier on this snapshot with the recent log window
    Classify {
        /// Sample to analyze
        sample: TelemetrySample,
    },
    /// Fan an alert out to the notification channels
    Notify {
        /// Message to broadcast
        message: AlertMessage,
    },
    /// Drive one reset cycle, then call `complete_remediation`
    Reset {
        /// Cycle parameters
        ticket: ExecutionTicket,
    },
    /// Queue the remediation command on the pipeline bridge
    Actuate {
        /// Command line to carry
        command: String,
    },
    /// Switch the telemetry fabricator regime
    SetPattern {
        /// Regime to apply
        pattern: SignalPattern,
        /// Auto-revert to nominal after this long
        revert_after: Option<Duration>,
    },
}

/// Outcome of a strike trigger request.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// Governor free; the strike is live
    Dispatched(Vec<Action>),
    /// Governor busy; parked in FIFO order
    Queued {
        /// Queue depth including this entry
        depth: usize,
    },
}

/// Single owner of the incident state machine.
pub struct IncidentCoordinator {
    config: SentinelConfig,
    state: IncidentState,
    detector: FractureDetector,
    stall: StallMonitor,
    phase: PhaseController,
    traffic: TrafficController,
    scheduler: DrillScheduler,
    audit: Arc<AuditLog>,
    bus: StrikeBus,
    journal: ForensicJournal,
    status: SystemStatus,
    uplink: UplinkHealth,
    last_sample: Option<TelemetrySample>,
    pending_source: Option<SourceTag>,
    pending_queue_delay: Duration,
    classifier_inflight: bool,
    last_classifier_launch: Option<Instant>,
    last_diagnosis: Option<Diagnosis>,
    hypothesis_match: bool,
    thought_latency: Option<Duration>,
    stall_seen_this_incident: bool,
    last_execute_error: Option<ExecuteError>,
}

impl IncidentCoordinator {
    /// Build a coordinator over a shared audit log and strike bus.
    #[must_use]
    pub fn new(config: SentinelConfig, audit: Arc<AuditLog>, bus: StrikeBus) -> Self {
        Self {
            detector: FractureDetector::from_config(&config),
            stall: StallMonitor::from_config(&config),
            phase: PhaseController::from_config(&config),
            traffic: TrafficController::from_config(&config),
            scheduler: DrillScheduler::from_config(&config),
            config,
            state: IncidentState::new(),
            audit,
            bus,
            journal: ForensicJournal::new(),
            status: SystemStatus::Nominal,
            uplink: UplinkHealth::Simulation,
            last_sample: None,
            pending_source: None,
            pending_queue_delay: Duration::ZERO,
            classifier_inflight: false,
            last_classifier_launch: None,
            last_diagnosis: None,
            hypothesis_match: false,
            thought_latency: None,
            stall_seen_this_incident: false,
            last_execute_error: None,
        }
    }

    /// Feed one telemetry sample. Drives the detector, stall monitor,
    /// countdown, classifier debounce and queue drain in that order.
    pub fn observe(&mut self, sample: &TelemetrySample, now: Instant, wall: DateTime<Utc>) -> Vec<Action> {
        let mut actions = Vec::new();
        self.last_sample = Some(sample.clone());

        match self.stall.observe(sample) {
            Some(StallEdge::Entered) => {
                self.state.stalled = true;
                self.stall_seen_this_incident = true;
            }
            Some(StallEdge::Cleared) => self.state.stalled = false,
            None => {}
        }

        let edge = self.detector.observe(sample, self.state.active);
        self.state.consecutive_bad_ticks = self.detector.consecutive_bad();
        match edge {
            Some(DetectorEdge::FractureConfirmed) => {
                actions.extend(self.confirm_fracture(sample, now, wall));
            }
            Some(DetectorEdge::SelfHealTrigger) => {
                actions.extend(self.self_heal(sample, now, wall));
            }
            Some(DetectorEdge::Recovered) => self.recover_silently(now),
            None => {}
        }

        match self.phase.tick(now) {
            Some(PhaseEvent::EnteredFailsafe) => {
                // Warning is logged by the controller; nothing else until expiry.
            }
            Some(PhaseEvent::FailsafeExpired) => {
                actions.extend(self.begin_remediation(
                    sample.clone(),
                    false,
                    SourceTag::AutoSentinelFailsafe,
                    Duration::ZERO,
                    now,
                ));
            }
            None => {}
        }

        if self.should_launch_classifier(now) {
            self.classifier_inflight = true;
            self.last_classifier_launch = Some(now);
            actions.push(Action::Classify {
                sample: sample.clone(),
            });
        }

        self.sync_traffic(now);
        if let Some(entry) = self.traffic.poll_dispatch(now) {
            let delay = now.duration_since(entry.enqueued_at);
            actions.extend(self.start_strike(entry.source, delay, now));
        }

        self.refresh_status();
        actions
    }

    /// Inject a strike from `source`. Serialized through the traffic
    /// controller: dispatched when the governor is free, queued otherwise.
    pub fn trigger_strike(&mut self, source: SourceTag, now: Instant, wall: DateTime<Utc>) -> TriggerOutcome {
        match self.traffic.request(source, now, wall) {
            StrikeDisposition::Dispatched => {
                TriggerOutcome::Dispatched(self.start_strike(source, Duration::ZERO, now))
            }
            StrikeDisposition::Queued { depth } => TriggerOutcome::Queued { depth },
        }
    }

    /// Check the drill calendar; fires at most one scheduled strike per
    /// eligible hour.
    pub fn check_schedule(&mut self, now: Instant, wall: DateTime<Utc>) -> Vec<Action> {
        let Some(source) = self.scheduler.due(wall) else {
            return Vec::new();
        };
        match self.trigger_strike(source, now, wall) {
            TriggerOutcome::Dispatched(actions) => actions,
            TriggerOutcome::Queued { depth } => {
                tracing::info!(depth, "scheduled drill queued behind an active incident");
                Vec::new()
            }
        }
    }

    /// Human override: commit remediation immediately, interrupting any
    /// armed countdown. With no active incident this is a pre-emptive
    /// manual strike: the incident begins and remediates in one motion.
    ///
    /// # Errors
    /// Returns [`ExecuteError::AlreadyExecuting`] while a cycle is in
    /// flight.
    pub fn commit_remediation(
        &mut self,
        source: SourceTag,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Result<Vec<Action>, ExecuteError> {
        if self.phase.is_executing() {
            return Err(ExecuteError::AlreadyExecuting);
        }
        // Pre-emptive commits are a human affordance; an automated source
        // committing with nothing active is a caller bug.
        if !self.state.active && source.is_automated() {
            return Err(ExecuteError::NothingActive);
        }
        let sample = self.last_sample.clone().unwrap_or_else(|| nominal_placeholder(wall));

        let mut actions = Vec::new();
        if !self.state.active {
            let id = IncidentId::new();
            self.state.begin(id, source, wall, now);
            self.bus.publish(StrikeSignal::triggered(source));
            tracing::info!(source = %source, incident = %id, "pre-emptive manual remediation");
        } else {
            tracing::info!(
                source = %source,
                phase = %self.phase.phase(),
                "human override, countdown interrupted"
            );
        }
        if let Some(incident) = self.state.id {
            actions.push(Action::Notify {
                message: AlertMessage::incident(
                    incident,
                    SystemStatus::Critical,
                    format!("manual remediation committed by {source}"),
                ),
            });
        }
        actions.extend(self.begin_remediation(sample, true, source, Duration::ZERO, now));
        self.sync_traffic(now);
        self.refresh_status();
        Ok(actions)
    }

    /// Report the outcome of the reset cycle for `ticket`.
    pub fn complete_remediation(
        &mut self,
        ticket: &ExecutionTicket,
        result: Result<(), ExecuteError>,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        let total = self
            .state
            .elapsed_since_detection(now)
            .unwrap_or(Duration::ZERO);

        match result {
            Ok(()) => {
                let row = self.build_completed_row(ticket, total, wall);
                self.audit.append(row);

                self.state.last_reset_at = Some(now);
                let incident = self.state.id;
                self.state.clear();
                self.detector.reset();
                self.phase.disarm();
                self.thought_latency = None;
                self.last_diagnosis = None;
                self.hypothesis_match = false;
                self.stall_seen_this_incident = false;
                self.last_execute_error = None;

                self.bus.publish(StrikeSignal::cleared(ticket.source, incident));
                tracing::info!(
                    incident = %ticket.incident,
                    source = %ticket.source,
                    total_secs = total.as_secs(),
                    "remediation complete, incident cleared"
                );
                actions.push(Action::SetPattern {
                    pattern: SignalPattern::Nominal,
                    revert_after: None,
                });
                actions.push(Action::Notify {
                    message: AlertMessage::incident(
                        ticket.incident,
                        SystemStatus::Nominal,
                        format!("instance recovered in {:.1}s", total.as_secs_f64()),
                    ),
                });
            }
            Err(err) => {
                // Fatal and user-visible. The incident stays active, the
                // frozen countdown is not re-armed, and automated sources
                // still pay the cooldown so the sentinel cannot hammer a
                // broken reset API.
                tracing::error!(
                    incident = %ticket.incident,
                    source = %ticket.source,
                    error = %err,
                    "remediation failed, incident remains active"
                );
                if !ticket.manual {
                    self.state.last_reset_at = Some(now);
                }
                self.phase.disarm();
                self.last_execute_error = Some(err);
                actions.push(Action::Notify {
                    message: AlertMessage::incident(
                        ticket.incident,
                        SystemStatus::Critical,
                        "instance reset failed, manual intervention required",
                    ),
                });
            }
        }

        self.sync_traffic(now);
        self.refresh_status();
        actions
    }

    /// Report a finished classifier run.
    pub fn classifier_completed(
        &mut self,
        sample: &TelemetrySample,
        diagnosis: Diagnosis,
        latency: Duration,
        wall: DateTime<Utc>,
    ) {
        self.classifier_inflight = false;
        self.thought_latency = Some(latency);

        if self.state.active {
            self.state.latch_confidence(diagnosis.confidence);
            self.hypothesis_match = hypothesis_matches(&self.detector, sample, &diagnosis);
            let shift = WatchShift::at(wall, self.config.shift_utc_offset_hours);
            self.journal.push(ForensicReport {
                timestamp: wall,
                shift: shift.as_str().to_string(),
                trigger: self
                    .state
                    .source
                    .map_or_else(|| SourceTag::Unknown.as_str().to_string(), |s| s.as_str().to_string()),
                confidence_label: confidence_label(self.state.peak_confidence).to_string(),
                analysis: diagnosis.analysis.clone(),
            });
            tracing::info!(
                confidence = diagnosis.confidence,
                peak = self.state.peak_confidence,
                hypothesis_match = self.hypothesis_match,
                "classifier verdict recorded"
            );
        }
        self.last_diagnosis = Some(diagnosis);
    }

    /// Apply a signal from another context. Idempotent: triggers while
    /// active and clears while idle are no-ops, so duplicated or reordered
    /// deliveries converge on the same state.
    pub fn apply_signal(&mut self, signal: &StrikeSignal, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        match signal.kind {
            SignalKind::Triggered => {
                if !self.state.active && self.pending_source.is_none() {
                    tracing::info!(source = %signal.source, "remote strike signal, arming simulation");
                    self.pending_source = Some(signal.source);
                    self.pending_queue_delay = Duration::ZERO;
                    actions.push(Action::SetPattern {
                        pattern: pattern_for(signal.source),
                        revert_after: self.revert_window(signal.source),
                    });
                }
            }
            SignalKind::Cleared => {
                if self.state.active && !self.phase.is_executing() {
                    tracing::info!(source = %signal.source, "remote clear signal, converging to idle");
                    self.state.clear();
                    self.detector.reset();
                    self.phase.disarm();
                    self.stall_seen_this_incident = false;
                    actions.push(Action::SetPattern {
                        pattern: SignalPattern::Nominal,
                        revert_after: None,
                    });
                }
                self.pending_source = None;
            }
        }
        self.sync_traffic(now);
        self.refresh_status();
        actions
    }

    /// Record the uplink health implied by the latest broadcast.
    pub fn record_uplink(&mut self, health: UplinkHealth) {
        if health != self.uplink {
            tracing::info!(?health, "uplink health changed");
        }
        self.uplink = health;
        self.refresh_status();
    }

    /// Operator-forced uplink resync: flips to reconnecting and emits a
    /// heartbeat probe.
    pub fn resync_uplink(&mut self) -> Vec<Action> {
        self.uplink = UplinkHealth::Reconnecting;
        self.refresh_status();
        vec![Action::Notify {
            message: AlertMessage::heartbeat(),
        }]
    }

    /// Remaining reset cooldown at `now`, if the governor is active.
    #[must_use]
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        let last = self.state.last_reset_at?;
        let elapsed = now.duration_since(last);
        let window = self.config.cooldown();
        if elapsed < window {
            Some(window - elapsed)
        } else {
            None
        }
    }

    /// Point-in-time view for the console and tests.
    #[must_use]
    pub fn snapshot(&self, now: Instant) -> HudSnapshot {
        HudSnapshot {
            phase: self.phase.phase(),
            phase_remaining: self.phase.remaining(now),
            active: self.state.active,
            incident: self.state.id,
            source: self.state.source,
            status: self.status,
            queue_depth: self.traffic.queue_depth(),
            consecutive_bad_ticks: self.state.consecutive_bad_ticks,
            stalled: self.state.stalled,
            peak_confidence: self.state.peak_confidence,
            cooldown_remaining: self.cooldown_remaining(now),
        }
    }

    /// Last fatal execution error, until the next successful cycle.
    #[must_use]
    pub fn last_execute_error(&self) -> Option<&ExecuteError> {
        self.last_execute_error.as_ref()
    }

    /// Latest classifier verdict.
    #[must_use]
    pub fn last_diagnosis(&self) -> Option<&Diagnosis> {
        self.last_diagnosis.as_ref()
    }

    /// Archived forensic reports, oldest first.
    #[must_use]
    pub fn journal_reports(&self) -> Vec<ForensicReport> {
        self.journal.reports()
    }

    /// The heartbeat cadence for a degraded uplink, `None` when healthy.
    #[must_use]
    pub fn heartbeat_due(&self) -> Option<Duration> {
        match self.uplink {
            UplinkHealth::Failure | UplinkHealth::Reconnecting => Some(self.config.heartbeat_retry()),
            UplinkHealth::Nominal | UplinkHealth::Simulation => None,
        }
    }

    /// Shared audit log handle.
    #[must_use]
    pub fn audit_log(&self) -> Arc<AuditLog> {
        Arc::clone(&self.audit)
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    // Strike dispatch once the governor has been taken: remembers the
    // attribution for the confirmation that follows and switches the
    // fabricator regime.
    fn start_strike(&mut self, source: SourceTag, queue_delay: Duration, _now: Instant) -> Vec<Action> {
        self.pending_source = Some(source);
        self.pending_queue_delay = queue_delay;
        self.bus.publish(StrikeSignal::triggered(source));
        tracing::info!(source = %source, queue_delay_secs = queue_delay.as_secs(), "strike live");
        vec![Action::SetPattern {
            pattern: pattern_for(source),
            revert_after: self.revert_window(source),
        }]
    }

    fn revert_window(&self, source: SourceTag) -> Option<Duration> {
        match source {
            SourceTag::AdminRemoteStrike => Some(self.config.remote_pulse()),
            SourceTag::RedTeamManual => Some(self.config.red_team_window()),
            _ => None,
        }
    }

    // Detector confirmed a fracture: stamp the incident, pick the gate.
    fn confirm_fracture(&mut self, sample: &TelemetrySample, now: Instant, wall: DateTime<Utc>) -> Vec<Action> {
        let source = self.pending_source.take().unwrap_or(SourceTag::Unknown);
        let id = IncidentId::new();
        self.state.begin(id, source, wall, now);
        self.state.queue_delay = std::mem::take(&mut self.pending_queue_delay);
        self.bus.publish(StrikeSignal::triggered(source));

        let mut actions = vec![Action::Notify {
            message: AlertMessage::incident(
                id,
                SystemStatus::ZombieKernel,
                format!(
                    "fracture confirmed on {} (cpu {:.2}%, ram {:.1}%)",
                    self.config.target.instance, sample.cpu, sample.ram
                ),
            ),
        }];

        let shift = WatchShift::at(wall, self.config.shift_utc_offset_hours);
        if source.bypasses_hold() || shift.is_autonomous() {
            let effective = if source.bypasses_hold() {
                source
            } else {
                SourceTag::AutoThirdShift
            };
            tracing::info!(source = %effective, shift = %shift, "human gate bypassed, autonomous remediation");
            match self.check_automated_cooldown(effective, sample, now, wall) {
                Ok(()) => {
                    actions.extend(self.begin_remediation(
                        sample.clone(),
                        false,
                        effective,
                        self.config.actuation_delay(),
                        now,
                    ));
                }
                Err(remaining) => {
                    // Governor blocked the autonomous path; fall back to
                    // the staffed countdown so the incident stays gated.
                    tracing::warn!(remaining_secs = remaining.as_secs(), "cooldown active, arming hold instead");
                    self.phase.arm(now);
                }
            }
        } else {
            self.phase.arm(now);
        }
        actions
    }

    // Signature persisting past confirmation. Only acts when the autonomy
    // gate allows; staffed shifts leave the armed countdown in charge.
    fn self_heal(&mut self, sample: &TelemetrySample, now: Instant, wall: DateTime<Utc>) -> Vec<Action> {
        if self.phase.is_executing() {
            return Vec::new();
        }
        let bypass = self.state.source.is_some_and(SourceTag::bypasses_hold);
        let shift = WatchShift::at(wall, self.config.shift_utc_offset_hours);
        if !bypass && !shift.is_autonomous() {
            return Vec::new();
        }
        let source = if bypass {
            self.state.source.unwrap_or(SourceTag::AutoThirdShift)
        } else {
            SourceTag::AutoThirdShift
        };
        match self.check_automated_cooldown(source, sample, now, wall) {
            Ok(()) => self.begin_remediation(
                sample.clone(),
                false,
                source,
                self.config.actuation_delay(),
                now,
            ),
            Err(_) => Vec::new(),
        }
    }

    // Cooldown governor for automated remediation. A rejection is logged
    // and recorded as an audit row so unattended suppressions stay
    // visible in the forensic record.
    fn check_automated_cooldown(
        &mut self,
        source: SourceTag,
        sample: &TelemetrySample,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Result<(), Duration> {
        let Some(remaining) = self.cooldown_remaining(now) else {
            return Ok(());
        };
        let err = TriggerError::CooldownActive {
            remaining_secs: remaining.as_secs(),
        };
        tracing::warn!(source = %source, error = %err, "automated trigger rejected");
        self.audit.append(self.build_rejected_row(source, sample, wall));
        Err(remaining)
    }

    // Freeze the countdown first so the in-flight guard blocks re-entry,
    // then hand the reset cycle to the runtime as a ticket.
    fn begin_remediation(
        &mut self,
        sample: TelemetrySample,
        manual: bool,
        source: SourceTag,
        delay: Duration,
        now: Instant,
    ) -> Vec<Action> {
        if self.phase.begin_execution().is_err() {
            tracing::debug!(source = %source, "remediation already in flight, trigger absorbed");
            return Vec::new();
        }
        let incident = self.state.id.unwrap_or_else(IncidentId::new);
        if self.state.id.is_none() {
            self.state.id = Some(incident);
        }
        let human_latency = if manual {
            self.state.elapsed_since_detection(now).unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        };
        let command = self.remediation_command();
        tracing::info!(
            incident = %incident,
            source = %source,
            manual,
            command = %command,
            "remediation engaged"
        );
        vec![
            Action::Actuate {
                command: command.clone(),
            },
            Action::Reset {
                ticket: ExecutionTicket {
                    incident,
                    source,
                    manual,
                    vitals: VitalsAtTrigger {
                        cpu: sample.cpu,
                        ram: sample.ram,
                    },
                    human_latency,
                    command,
                    delay,
                },
            },
        ]
    }

    // Telemetry returned to the recovery envelope on its own: the incident
    // clears with no executor run and no audit row.
    fn recover_silently(&mut self, now: Instant) {
        let incident = self.state.id;
        self.state.clear();
        self.detector.reset();
        self.phase.disarm();
        self.stall_seen_this_incident = false;
        self.bus
            .publish(StrikeSignal::cleared(SourceTag::Unknown, incident));
        self.sync_traffic(now);
    }

    fn should_launch_classifier(&self, now: Instant) -> bool {
        if !self.state.active || self.classifier_inflight {
            return false;
        }
        self.last_classifier_launch
            .map_or(true, |t| now.duration_since(t) >= self.config.classifier_debounce())
    }

    // Pending attribution counts as busy: a dispatched strike holds the
    // governor through the confirmation lag, not just once the incident
    // is stamped.
    fn sync_traffic(&mut self, now: Instant) {
        let busy = self.state.active
            || self.classifier_inflight
            || self.phase.is_executing()
            || self.pending_source.is_some();
        self.traffic.set_busy(busy, now);
    }

    fn refresh_status(&mut self) {
        if matches!(self.uplink, UplinkHealth::Failure | UplinkHealth::Reconnecting) {
            self.status = match self.uplink {
                UplinkHealth::Failure => SystemStatus::UplinkFailure,
                _ => SystemStatus::UplinkReconnecting,
            };
            return;
        }
        self.status = if self.state.active {
            match self.state.source {
                Some(s) if s.is_adversary() => SystemStatus::AdversaryEmulation,
                Some(s) if s.bypasses_hold() => SystemStatus::ScheduledProtocol,
                _ => SystemStatus::ZombieKernel,
            }
        } else if self.state.consecutive_bad_ticks > 0 {
            SystemStatus::Warning
        } else if self.uplink == UplinkHealth::Simulation {
            SystemStatus::UplinkSimulation
        } else {
            SystemStatus::Nominal
        };
    }

    fn remediation_command(&self) -> String {
        self.last_diagnosis
            .as_ref()
            .and_then(|d| d.interventions.first())
            .map_or_else(
                || {
                    format!(
                        "gcloud compute instances reset {} --zone={}",
                        self.config.target.instance, self.config.target.zone
                    )
                },
                |i| i.cli_command.clone(),
            )
    }

    fn build_completed_row(&self, ticket: &ExecutionTicket, total: Duration, wall: DateTime<Utc>) -> AuditRecord {
        let incident_source = self.state.source.unwrap_or(ticket.source);
        let drill = matches!(
            incident_source,
            SourceTag::AutoScheduler | SourceTag::AutoSentinelScheduled
        );
        let total_secs = total.as_secs_f64();
        AuditRecord {
            timestamp: wall,
            incident: ticket.incident,
            source: ticket.source,
            trigger_label: AuditRecord::trigger_label_for(ticket.source).to_string(),
            remediation_type: if ticket.manual {
                RemediationType::ManualOperator
            } else {
                RemediationType::SentinelAi
            },
            vitals: ticket.vitals,
            thought_latency_secs: self.thought_latency.map_or(0.0, |d| d.as_secs_f64()),
            total_recovery_secs: total_secs,
            shift: WatchShift::at(wall, self.config.shift_utc_offset_hours),
            drill,
            hypothesis_match: self.hypothesis_match,
            forensic_confidence: self.state.peak_confidence,
            cognitive_load: cognitive_load(ticket.source, total_secs),
            stall_detected: self.stall_seen_this_incident,
            queue_delay_secs: self.state.queue_delay.as_secs_f64(),
            adversary_mode: incident_source.is_adversary() || ticket.source.is_adversary(),
            human_latency_secs: ticket.human_latency.as_secs_f64(),
            prev_hash: [0u8; 32],
            hash: [0u8; 32],
        }
    }

    fn build_rejected_row(&self, source: SourceTag, sample: &TelemetrySample, wall: DateTime<Utc>) -> AuditRecord {
        AuditRecord {
            timestamp: wall,
            incident: self.state.id.unwrap_or_else(IncidentId::new),
            source,
            trigger_label: REJECTED_TRIGGER_LABEL.to_string(),
            remediation_type: RemediationType::SentinelAi,
            vitals: VitalsAtTrigger {
                cpu: sample.cpu,
                ram: sample.ram,
            },
            thought_latency_secs: 0.0,
            total_recovery_secs: 0.0,
            shift: WatchShift::at(wall, self.config.shift_utc_offset_hours),
            drill: false,
            hypothesis_match: false,
            forensic_confidence: self.state.peak_confidence,
            cognitive_load: cognitive_load(source, 0.0),
            stall_detected: self.stall_seen_this_incident,
            queue_delay_secs: 0.0,
            adversary_mode: source.is_adversary(),
            human_latency_secs: 0.0,
            prev_hash: [0u8; 32],
            hash: [0u8; 32],
        }
    }
}

fn pattern_for(source: SourceTag) -> SignalPattern {
    match source {
        SourceTag::AdminRemoteStrike => SignalPattern::RemotePulse,
        SourceTag::RedTeamManual => SignalPattern::CpuStrike,
        _ => SignalPattern::Zombie,
    }
}

fn hypothesis_matches(detector: &FractureDetector, sample: &TelemetrySample, diagnosis: &Diagnosis) -> bool {
    if detector.zombie_signature(sample) {
        return diagnosis.status == SystemStatus::ZombieKernel;
    }
    if detector.strike_signature(sample) {
        return matches!(
            diagnosis.status,
            SystemStatus::Warning | SystemStatus::Critical
        );
    }
    diagnosis.status == SystemStatus::Nominal
}

fn nominal_placeholder(wall: DateTime<Utc>) -> TelemetrySample {
    TelemetrySample::new(wall, 0.0, 0.0, 0, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::HeuristicClassifier;

    fn fast_config() -> SentinelConfig {
        SentinelConfig::default()
            .with_hold_secs(180)
            .with_failsafe_secs(120)
            .with_cooldown_secs(300)
            .with_settle_delay_secs(10)
    }

    fn coordinator() -> IncidentCoordinator {
        IncidentCoordinator::new(fast_config(), Arc::new(AuditLog::new()), StrikeBus::default())
    }

    fn zombie(wall: DateTime<Utc>) -> TelemetrySample {
        TelemetrySample::new(wall, 1.0, 95.0, 200, 0.5)
    }

    fn nominal(wall: DateTime<Utc>) -> TelemetrySample {
        TelemetrySample::new(wall, 50.0, 32.0, 150, 2.0)
    }

    /// Daytime wall clock (first shift at the default -6 offset) so the
    /// autonomy gate stays closed unless a test opens it.
    fn staffed_wall() -> DateTime<Utc> {
        use chrono::TimeZone;
        Utc.with_ymd_and_hms(2025, 6, 10, 18, 0, 0).unwrap()
    }

    fn confirm_incident(c: &mut IncidentCoordinator, now: Instant, wall: DateTime<Utc>) -> Vec<Action> {
        let mut actions = Vec::new();
        for i in 0..3 {
            let t = now + Duration::from_secs(i);
            actions.extend(c.observe(&zombie(wall), t, wall));
        }
        actions
    }

    #[test]
    fn confirmation_arms_the_hold_and_launches_the_classifier() {
        let mut c = coordinator();
        let now = Instant::now();
        let wall = staffed_wall();
        let actions = confirm_incident(&mut c, now, wall);

        let snap = c.snapshot(now + Duration::from_secs(2));
        assert!(snap.active);
        assert_eq!(snap.phase, RemediationPhase::Hold);
        assert_eq!(snap.status, SystemStatus::ZombieKernel);
        assert!(actions.iter().any(|a| matches!(a, Action::Classify { .. })));
        assert!(actions.iter().any(|a| matches!(a, Action::Notify { .. })));
        // No reset was issued: the human gate is closed on a staffed shift.
        assert!(!actions.iter().any(|a| matches!(a, Action::Reset { .. })));
    }

    #[test]
    fn failsafe_expiry_yields_an_autonomous_reset_ticket() {
        let mut c = coordinator();
        let t0 = Instant::now();
        let wall = staffed_wall();
        confirm_incident(&mut c, t0, wall);

        let expiry = t0 + Duration::from_secs(2) + Duration::from_secs(300);
        // One tick to cross into fail-safe, one to expire it.
        c.observe(&zombie(wall), expiry, wall);
        let actions = c.observe(&zombie(wall), expiry + Duration::from_secs(1), wall);

        let ticket = actions
            .iter()
            .find_map(|a| match a {
                Action::Reset { ticket } => Some(ticket.clone()),
                _ => None,
            })
            .expect("fail-safe expiry must issue a reset");
        assert_eq!(ticket.source, SourceTag::AutoSentinelFailsafe);
        assert!(!ticket.manual);
        assert!(c.snapshot(expiry).phase == RemediationPhase::Executing);
    }

    #[test]
    fn successful_completion_clears_state_and_audits_once() {
        let mut c = coordinator();
        let t0 = Instant::now();
        let wall = staffed_wall();
        confirm_incident(&mut c, t0, wall);

        let commit_at = t0 + Duration::from_secs(45);
        let actions = c.commit_remediation(SourceTag::DashboardManual, commit_at, wall).unwrap();
        let ticket = actions
            .iter()
            .find_map(|a| match a {
                Action::Reset { ticket } => Some(ticket.clone()),
                _ => None,
            })
            .unwrap();
        assert!(ticket.manual);
        assert_eq!(ticket.human_latency, Duration::from_secs(43));

        let done_at = commit_at + Duration::from_secs(3);
        c.complete_remediation(&ticket, Ok(()), done_at, wall);

        let snap = c.snapshot(done_at);
        assert!(!snap.active);
        assert_eq!(snap.phase, RemediationPhase::Idle);
        assert!(snap.cooldown_remaining.is_some());

        let rows = c.audit_log().records();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].trigger_label, "MANUAL");
        assert_eq!(rows[0].remediation_type, RemediationType::ManualOperator);
        assert!(c.audit_log().verify_integrity().is_ok());
    }

    #[test]
    fn failed_completion_keeps_the_incident_and_writes_no_row() {
        let mut c = coordinator();
        let t0 = Instant::now();
        let wall = staffed_wall();
        confirm_incident(&mut c, t0, wall);

        let commit_at = t0 + Duration::from_secs(10);
        let actions = c.commit_remediation(SourceTag::DashboardManual, commit_at, wall).unwrap();
        let ticket = actions
            .iter()
            .find_map(|a| match a {
                Action::Reset { ticket } => Some(ticket.clone()),
                _ => None,
            })
            .unwrap();

        let failed_at = commit_at + Duration::from_secs(3);
        c.complete_remediation(
            &ticket,
            Err(ExecuteError::ResetFailed("api 503".into())),
            failed_at,
            wall,
        );

        let snap = c.snapshot(failed_at);
        assert!(snap.active, "incident must stay active after a failed reset");
        assert_eq!(snap.phase, RemediationPhase::Idle, "frozen countdown is not re-armed");
        assert!(c.audit_log().is_empty(), "failed cycles do not fabricate audit rows");
        assert!(matches!(
            c.last_execute_error(),
            Some(ExecuteError::ResetFailed(_))
        ));
        // Manual run: no cooldown charged.
        assert!(snap.cooldown_remaining.is_none());
    }

    #[test]
    fn recovery_clears_without_executor_or_audit() {
        let mut c = coordinator();
        let t0 = Instant::now();
        let wall = staffed_wall();
        confirm_incident(&mut c, t0, wall);
        assert!(c.snapshot(t0).active);

        let actions = c.observe(&nominal(wall), t0 + Duration::from_secs(5), wall);
        let snap = c.snapshot(t0 + Duration::from_secs(5));
        assert!(!snap.active);
        assert_eq!(snap.phase, RemediationPhase::Idle);
        assert!(c.audit_log().is_empty());
        assert!(!actions.iter().any(|a| matches!(a, Action::Reset { .. })));
    }

    #[test]
    fn strikes_collide_into_the_queue_and_drain_after_settle() {
        let mut c = coordinator();
        let t0 = Instant::now();
        let wall = staffed_wall();

        let first = c.trigger_strike(SourceTag::DashboardManual, t0, wall);
        assert!(matches!(first, TriggerOutcome::Dispatched(_)));
        let second = c.trigger_strike(SourceTag::RedTeamManual, t0 + Duration::from_secs(1), wall);
        assert!(matches!(second, TriggerOutcome::Queued { depth: 1 }));

        // Confirm, commit, and complete the first incident. The classifier
        // verdict has to land before the governor can ever read as free.
        confirm_incident(&mut c, t0 + Duration::from_secs(2), wall);
        let sample = zombie(wall);
        let verdict = HeuristicClassifier::from_config(c.config()).classify(&sample);
        c.classifier_completed(&sample, verdict, Duration::from_millis(1500), wall);
        let commit_at = t0 + Duration::from_secs(20);
        let actions = c.commit_remediation(SourceTag::DashboardManual, commit_at, wall).unwrap();
        let ticket = actions
            .iter()
            .find_map(|a| match a {
                Action::Reset { ticket } => Some(ticket.clone()),
                _ => None,
            })
            .unwrap();
        let done_at = commit_at + Duration::from_secs(3);
        c.complete_remediation(&ticket, Ok(()), done_at, wall);
        assert_eq!(c.snapshot(done_at).queue_depth, 1);

        // Nominal ticks through the settle window, then the queue drains.
        let mut drained = Vec::new();
        for i in 1..=12 {
            let t = done_at + Duration::from_secs(i);
            drained.extend(c.observe(&nominal(wall), t, wall));
        }
        assert!(
            drained
                .iter()
                .any(|a| matches!(a, Action::SetPattern { pattern: SignalPattern::CpuStrike, .. })),
            "queued red-team strike must go live after the settle window"
        );
        assert_eq!(c.snapshot(done_at + Duration::from_secs(12)).queue_depth, 0);
    }

    #[test]
    fn remote_signals_apply_idempotently() {
        let mut c = coordinator();
        let t0 = Instant::now();
        let wall = staffed_wall();

        let trigger = StrikeSignal::triggered(SourceTag::AdminRemoteStrike);
        let first = c.apply_signal(&trigger, t0);
        assert!(first
            .iter()
            .any(|a| matches!(a, Action::SetPattern { pattern: SignalPattern::RemotePulse, .. })));
        // Duplicate delivery: converged already, no further effects.
        assert!(c.apply_signal(&trigger, t0 + Duration::from_secs(1)).is_empty());

        confirm_incident(&mut c, t0 + Duration::from_secs(2), wall);
        assert!(c.snapshot(t0).active);
        assert_eq!(c.snapshot(t0).status, SystemStatus::AdversaryEmulation);

        let clear = StrikeSignal::cleared(SourceTag::DashboardManual, None);
        let actions = c.apply_signal(&clear, t0 + Duration::from_secs(6));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::SetPattern { pattern: SignalPattern::Nominal, .. })));
        assert!(!c.snapshot(t0).active);
        // Clearing an idle context is a no-op.
        assert!(c.apply_signal(&clear, t0 + Duration::from_secs(7)).is_empty());
    }

    #[test]
    fn classifier_verdict_latches_peak_confidence_and_journals() {
        let mut c = coordinator();
        let t0 = Instant::now();
        let wall = staffed_wall();
        confirm_incident(&mut c, t0, wall);

        let heuristic = HeuristicClassifier::from_config(c.config());
        let sample = zombie(wall);
        let verdict = heuristic.classify(&sample);
        c.classifier_completed(&sample, verdict, Duration::from_millis(1800), wall);

        let snap = c.snapshot(t0);
        assert_eq!(snap.peak_confidence, 95);
        let reports = c.journal_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].confidence_label, "VERIFIED_C2_FRACTURE");

        // A weaker follow-up verdict cannot lower the latch.
        let weak = Diagnosis {
            confidence: 20,
            ..heuristic.classify(&sample)
        };
        c.classifier_completed(&sample, weak, Duration::from_millis(900), wall);
        assert_eq!(c.snapshot(t0).peak_confidence, 95);
    }
}
