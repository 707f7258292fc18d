//! Sentinel runtime actor
//!
//! Owns the [`IncidentCoordinator`] and the telemetry fabricator inside a
//! single tokio task fed by an mpsc command queue. Everything that can
//! take time runs in a spawned task and re-enters the queue as a command
//! when it finishes: classifier verdicts, reset outcomes, alert fan-out
//! results, pattern reverts. The queue is the serialization point, so the
//! coordinator never needs a lock and ticks keep flowing while I/O is in
//! flight.
//!
//! [`SentinelHandle`] is the cloneable entry point for the console and
//! for tests.

use crate::alert::{AlertBroadcaster, UplinkHealth};
use crate::audit::AuditLog;
use crate::bus::{StrikeBus, StrikeSignal};
use crate::classifier::{
    Classifier, Diagnosis, FallbackClassifier, ForensicReport, HeuristicClassifier, SimulatedUplink,
};
use crate::config::SentinelConfig;
use crate::coordinator::{Action, ExecutionTicket, IncidentCoordinator, TriggerOutcome};
use crate::error::{ExecuteError, HudError, RuntimeError};
use crate::executor::{PipelineBridge, ResetApi, SimulatedPipelineBridge, SimulatedResetApi};
use crate::types::{HudSnapshot, SourceTag};
use chrono::Utc;
use hud_telemetry::{LogWindow, SignalGenerator, SignalPattern, TelemetryRing, TelemetrySample};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const COMMAND_BUFFER: usize = 100;

/// How a strike trigger was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReceipt {
    /// Governor free; the strike is live
    Dispatched,
    /// Parked behind the active incident
    Queued {
        /// Queue depth including this entry
        depth: usize,
    },
}

/// I/O seams injected into the runtime. Defaults to the fully simulated
/// stack.
pub struct RuntimeDeps {
    /// Instance reset seam
    pub reset_api: Arc<dyn ResetApi>,
    /// CI pipeline seam
    pub bridge: Arc<dyn PipelineBridge>,
    /// Primary forensic classifier
    pub classifier: Arc<dyn Classifier>,
    /// Alert fan-out
    pub broadcaster: Arc<AlertBroadcaster>,
}

impl Default for RuntimeDeps {
    fn default() -> Self {
        Self {
            reset_api: Arc::new(SimulatedResetApi::new()),
            bridge: Arc::new(SimulatedPipelineBridge),
            classifier: Arc::new(SimulatedUplink::new(HeuristicClassifier::new(
                crate::config::Thresholds::default(),
            ))),
            broadcaster: Arc::new(AlertBroadcaster::standard()),
        }
    }
}

enum Command {
    Tick,
    CheckSchedule,
    TriggerStrike {
        source: SourceTag,
        respond_to: oneshot::Sender<TriggerReceipt>,
    },
    CommitRemediation {
        source: SourceTag,
        respond_to: oneshot::Sender<Result<(), ExecuteError>>,
    },
    ResetCompleted {
        ticket: ExecutionTicket,
        result: Result<(), ExecuteError>,
    },
    ClassifierDone {
        sample: TelemetrySample,
        diagnosis: Diagnosis,
        latency: Duration,
    },
    AlertDispatched {
        health: UplinkHealth,
    },
    BusSignal(StrikeSignal),
    RevertPattern {
        from: SignalPattern,
    },
    Heartbeat,
    ResyncUplink,
    Snapshot {
        respond_to: oneshot::Sender<HudSnapshot>,
    },
    Journal {
        respond_to: oneshot::Sender<Vec<ForensicReport>>,
    },
    AuditCsv {
        respond_to: oneshot::Sender<String>,
    },
    ExportAudit {
        path: PathBuf,
        respond_to: oneshot::Sender<Result<usize, crate::error::AuditError>>,
    },
    Shutdown,
}

/// Cloneable front door to the runtime task.
#[derive(Clone)]
pub struct SentinelHandle {
    sender: mpsc::Sender<Command>,
    bus: StrikeBus,
}

impl SentinelHandle {
    /// Inject a strike attributed to `source`.
    ///
    /// # Errors
    /// [`HudError::Runtime`] when the runtime task has shut down.
    pub async fn trigger_strike(&self, source: SourceTag) -> Result<TriggerReceipt, HudError> {
        self.request(|respond_to| Command::TriggerStrike { source, respond_to })
            .await
    }

    /// Commit remediation as `source`, interrupting any armed countdown.
    ///
    /// # Errors
    /// [`HudError::Execute`] for guard violations, [`HudError::Runtime`]
    /// when the runtime task has shut down.
    pub async fn commit_remediation(&self, source: SourceTag) -> Result<(), HudError> {
        self.request(|respond_to| Command::CommitRemediation { source, respond_to })
            .await?
            .map_err(HudError::from)
    }

    /// Point-in-time view of the incident state machine.
    ///
    /// # Errors
    /// [`HudError::Runtime`] when the runtime task has shut down.
    pub async fn snapshot(&self) -> Result<HudSnapshot, HudError> {
        self.request(|respond_to| Command::Snapshot { respond_to }).await
    }

    /// Archived forensic reports, oldest first.
    ///
    /// # Errors
    /// [`HudError::Runtime`] when the runtime task has shut down.
    pub async fn journal(&self) -> Result<Vec<ForensicReport>, HudError> {
        self.request(|respond_to| Command::Journal { respond_to }).await
    }

    /// Render the audit log as CSV.
    ///
    /// # Errors
    /// [`HudError::Runtime`] when the runtime task has shut down.
    pub async fn audit_csv(&self) -> Result<String, HudError> {
        self.request(|respond_to| Command::AuditCsv { respond_to }).await
    }

    /// Export the audit log to `path` after verifying the hash chain.
    ///
    /// # Errors
    /// [`HudError::Audit`] for chain or I/O failures, [`HudError::Runtime`]
    /// when the runtime task has shut down.
    pub async fn export_audit(&self, path: PathBuf) -> Result<usize, HudError> {
        self.request(|respond_to| Command::ExportAudit { path, respond_to })
            .await?
            .map_err(HudError::from)
    }

    /// Force an uplink resync probe.
    ///
    /// # Errors
    /// [`HudError::Runtime`] when the runtime task has shut down.
    pub async fn resync_uplink(&self) -> Result<(), HudError> {
        self.send(Command::ResyncUplink).await
    }

    /// Stop the runtime task. Idempotent.
    ///
    /// # Errors
    /// [`HudError::Runtime`] when the runtime task already shut down.
    pub async fn shutdown(&self) -> Result<(), HudError> {
        self.send(Command::Shutdown).await
    }

    /// The strike bus this runtime publishes on and listens to. Publish
    /// here to emulate a remote console context.
    #[must_use]
    pub fn bus(&self) -> StrikeBus {
        self.bus.clone()
    }

    async fn send(&self, command: Command) -> Result<(), HudError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| HudError::from(RuntimeError::ChannelClosed))
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, HudError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| HudError::from(RuntimeError::ChannelClosed))
    }
}

/// The runtime task state: coordinator plus the simulation fabric.
pub struct SentinelRuntime {
    coordinator: IncidentCoordinator,
    generator: SignalGenerator,
    ring: TelemetryRing,
    window: LogWindow,
    classifier: Arc<FallbackClassifier>,
    broadcaster: Arc<AlertBroadcaster>,
    reset_api: Arc<dyn ResetApi>,
    bridge: Arc<dyn PipelineBridge>,
    tx: mpsc::Sender<Command>,
    heartbeat_pending: bool,
}

impl SentinelRuntime {
    /// Spawn the runtime and its tickers; returns the handle and the task.
    #[must_use]
    pub fn spawn(config: SentinelConfig, deps: RuntimeDeps) -> (SentinelHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let bus = StrikeBus::default();
        let audit = Arc::new(AuditLog::new());
        let classifier = Arc::new(FallbackClassifier::new(
            deps.classifier,
            HeuristicClassifier::from_config(&config),
        ));

        let mut generator = SignalGenerator::new(config.sim_seed);
        let mut ring = TelemetryRing::new(config.history_points);
        let step_ms = i64::try_from(config.tick_interval_ms).unwrap_or(1_000);
        for sample in generator.backfill(config.history_points, Utc::now(), step_ms) {
            ring.push(sample);
        }

        spawn_ticker(tx.clone(), config.tick_interval(), || Command::Tick);
        spawn_ticker(tx.clone(), config.scheduler_cadence(), || Command::CheckSchedule);
        spawn_bus_echo(tx.clone(), bus.subscribe());

        let runtime = Self {
            window: LogWindow::new(config.log_window_lines),
            coordinator: IncidentCoordinator::new(config, audit, bus.clone()),
            generator,
            ring,
            classifier,
            broadcaster: deps.broadcaster,
            reset_api: deps.reset_api,
            bridge: deps.bridge,
            tx: tx.clone(),
            heartbeat_pending: false,
        };
        let join = tokio::spawn(sentinel_task(runtime, rx));
        (SentinelHandle { sender: tx, bus }, join)
    }

    // Returns false when the loop should stop.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Tick => {
                let wall = Utc::now();
                let sample = self.generator.next_sample(wall);
                self.window.push(self.generator.next_log_line());
                self.ring.push(sample.clone());
                let actions = self.coordinator.observe(&sample, Instant::now(), wall);
                self.perform(actions);
            }
            Command::CheckSchedule => {
                let actions = self.coordinator.check_schedule(Instant::now(), Utc::now());
                self.perform(actions);
            }
            Command::TriggerStrike { source, respond_to } => {
                let receipt = match self.coordinator.trigger_strike(source, Instant::now(), Utc::now()) {
                    TriggerOutcome::Dispatched(actions) => {
                        self.perform(actions);
                        TriggerReceipt::Dispatched
                    }
                    TriggerOutcome::Queued { depth } => TriggerReceipt::Queued { depth },
                };
                let _ = respond_to.send(receipt);
            }
            Command::CommitRemediation { source, respond_to } => {
                let reply = match self.coordinator.commit_remediation(source, Instant::now(), Utc::now()) {
                    Ok(actions) => {
                        self.perform(actions);
                        Ok(())
                    }
                    Err(err) => Err(err),
                };
                let _ = respond_to.send(reply);
            }
            Command::ResetCompleted { ticket, result } => {
                let actions =
                    self.coordinator
                        .complete_remediation(&ticket, result, Instant::now(), Utc::now());
                self.perform(actions);
            }
            Command::ClassifierDone {
                sample,
                diagnosis,
                latency,
            } => {
                self.coordinator
                    .classifier_completed(&sample, diagnosis, latency, Utc::now());
            }
            Command::AlertDispatched { health } => {
                self.coordinator.record_uplink(health);
                self.maybe_schedule_heartbeat();
            }
            Command::BusSignal(signal) => {
                let actions = self.coordinator.apply_signal(&signal, Instant::now());
                self.perform(actions);
            }
            Command::RevertPattern { from } => {
                // Only revert if the transient regime is still the live one;
                // a newer strike may have replaced it.
                if self.generator.pattern() == from {
                    self.generator.set_pattern(SignalPattern::Nominal);
                }
            }
            Command::Heartbeat => {
                self.heartbeat_pending = false;
                if self.coordinator.heartbeat_due().is_some() {
                    let actions = self.coordinator.resync_uplink();
                    self.perform(actions);
                }
            }
            Command::ResyncUplink => {
                let actions = self.coordinator.resync_uplink();
                self.perform(actions);
            }
            Command::Snapshot { respond_to } => {
                let _ = respond_to.send(self.coordinator.snapshot(Instant::now()));
            }
            Command::Journal { respond_to } => {
                let _ = respond_to.send(self.coordinator.journal_reports());
            }
            Command::AuditCsv { respond_to } => {
                let _ = respond_to.send(self.coordinator.audit_log().to_csv());
            }
            Command::ExportAudit { path, respond_to } => {
                let _ = respond_to.send(self.coordinator.audit_log().export(&path));
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn perform(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Classify { sample } => {
                    let classifier = Arc::clone(&self.classifier);
                    let logs = self.window.recent(20);
                    let tx = self.tx.clone();
                    tokio::spawn(async move {
                        let started = Instant::now();
                        let diagnosis = classifier.analyze(&sample, &logs).await;
                        let latency = started.elapsed();
                        let _ = tx
                            .send(Command::ClassifierDone {
                                sample,
                                diagnosis,
                                latency,
                            })
                            .await;
                    });
                }
                Action::Notify { message } => {
                    let broadcaster = Arc::clone(&self.broadcaster);
                    let tx = self.tx.clone();
                    tokio::spawn(async move {
                        let summary = broadcaster.broadcast(&message).await;
                        let _ = tx
                            .send(Command::AlertDispatched {
                                health: summary.uplink_health(),
                            })
                            .await;
                    });
                }
                Action::Reset { ticket } => {
                    let api = Arc::clone(&self.reset_api);
                    let target = self.coordinator.config().target.clone();
                    let tx = self.tx.clone();
                    tokio::spawn(async move {
                        if !ticket.delay.is_zero() {
                            tokio::time::sleep(ticket.delay).await;
                        }
                        let result = api.reset_instance(&target).await;
                        let _ = tx.send(Command::ResetCompleted { ticket, result }).await;
                    });
                }
                Action::Actuate { command } => {
                    let bridge = Arc::clone(&self.bridge);
                    tokio::spawn(async move {
                        let outcome = bridge.trigger(&command).await;
                        tracing::info!(
                            accepted = outcome.accepted,
                            simulated = outcome.simulated,
                            detail = %outcome.detail,
                            "actuation bridge outcome"
                        );
                    });
                }
                Action::SetPattern {
                    pattern,
                    revert_after,
                } => {
                    self.generator.set_pattern(pattern);
                    if let Some(after) = revert_after {
                        let tx = self.tx.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(after).await;
                            let _ = tx.send(Command::RevertPattern { from: pattern }).await;
                        });
                    }
                }
            }
        }
    }

    fn maybe_schedule_heartbeat(&mut self) {
        if self.heartbeat_pending {
            return;
        }
        let Some(retry) = self.coordinator.heartbeat_due() else {
            return;
        };
        self.heartbeat_pending = true;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(retry).await;
            let _ = tx.send(Command::Heartbeat).await;
        });
    }
}

async fn sentinel_task(mut runtime: SentinelRuntime, mut rx: mpsc::Receiver<Command>) {
    tracing::info!(version = crate::VERSION, "sentinel runtime started");
    while let Some(command) = rx.recv().await {
        if !runtime.handle_command(command).await {
            break;
        }
    }
    tracing::info!("sentinel runtime stopped");
}

fn spawn_ticker(
    tx: mpsc::Sender<Command>,
    period: Duration,
    make: impl Fn() -> Command + Send + 'static,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so cadence work
        // starts one full period in.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if tx.send(make()).await.is_err() {
                break;
            }
        }
    });
}

fn spawn_bus_echo(tx: mpsc::Sender<Command>, mut rx: tokio::sync::broadcast::Receiver<StrikeSignal>) {
    use tokio::sync::broadcast::error::RecvError;
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(signal) => {
                    if tx.send(Command::BusSignal(signal)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "strike bus receiver lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RemediationPhase;

    #[tokio::test]
    async fn snapshot_reflects_the_idle_fabric() {
        let (handle, join) = SentinelRuntime::spawn(SentinelConfig::default(), RuntimeDeps::default());
        let snap = handle.snapshot().await.unwrap();
        assert!(!snap.active);
        assert_eq!(snap.phase, RemediationPhase::Idle);
        assert_eq!(snap.queue_depth, 0);
        handle.shutdown().await.unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn second_strike_queues_behind_the_first() {
        let (handle, join) = SentinelRuntime::spawn(SentinelConfig::default(), RuntimeDeps::default());
        let first = handle.trigger_strike(SourceTag::DashboardManual).await.unwrap();
        assert_eq!(first, TriggerReceipt::Dispatched);
        let second = handle.trigger_strike(SourceTag::RedTeamManual).await.unwrap();
        assert_eq!(second, TriggerReceipt::Queued { depth: 1 });
        handle.shutdown().await.unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn audit_csv_starts_with_the_header() {
        let (handle, join) = SentinelRuntime::spawn(SentinelConfig::default(), RuntimeDeps::default());
        let csv = handle.audit_csv().await.unwrap();
        assert!(csv.starts_with(crate::audit::CSV_HEADER));
        handle.shutdown().await.unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn export_audit_writes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.csv");
        let (handle, join) = SentinelRuntime::spawn(SentinelConfig::default(), RuntimeDeps::default());
        let written = handle.export_audit(path.clone()).await.unwrap();
        assert_eq!(written, 0, "empty log exports zero rows");
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with(crate::audit::CSV_HEADER));
        handle.shutdown().await.unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn handle_errors_after_shutdown() {
        let (handle, join) = SentinelRuntime::spawn(SentinelConfig::default(), RuntimeDeps::default());
        handle.shutdown().await.unwrap();
        join.await.unwrap();
        let err = handle.snapshot().await.unwrap_err();
        assert!(matches!(err, HudError::Runtime(RuntimeError::ChannelClosed)));
    }
}
