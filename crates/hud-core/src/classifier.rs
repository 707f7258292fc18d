//! Forensic classifier seam
//!
//! The sentinel asks a classifier for a hypothesis whenever an incident
//! confirms: what failed, how confident, and which interventions apply.
//! Remote classifiers are opaque behind the [`Classifier`] trait; the
//! local [`HeuristicClassifier`] is always available and the
//! [`FallbackClassifier`] guarantees the incident path never waits on a
//! dead uplink.
//!
//! Confidence is a 0-100 score. The peak score per incident is latched by
//! the coordinator and rendered through [`confidence_label`].

use crate::config::{SentinelConfig, Thresholds};
use crate::error::ClassifyError;
use crate::types::SystemStatus;
use async_trait::async_trait;
use hud_telemetry::TelemetrySample;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Reports retained by the forensic journal.
pub const MAX_JOURNAL_REPORTS: usize = 20;

/// Failure-stage taxonomy attached to a diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureStage {
    /// No staged failure identified
    None,
    /// Full scheduler wipeout
    Wipeout,
    /// Partial starvation dragging the host under
    Undertow,
    /// Host climbing back out
    Recovery,
}

impl FailureStage {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Wipeout => "WIPEOUT",
            Self::Undertow => "UNDERTOW",
            Self::Recovery => "RECOVERY",
        }
    }
}

/// One remediation option proposed by a classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    /// Protocol family, e.g. `PROC_TERMINATE`
    pub protocol: String,
    /// Human-readable action
    pub action: String,
    /// Exact command the actuation bridge would carry
    pub cli_command: String,
    /// Why this intervention applies
    pub description: String,
    /// Classifier confidence in this option, 0-100
    pub confidence: u8,
}

/// Classifier output for one incident snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Status hypothesis
    pub status: SystemStatus,
    /// Failure stage
    pub stage: FailureStage,
    /// Confidence 0-100
    pub confidence: u8,
    /// Free-text analysis
    pub analysis: String,
    /// Proposed interventions, best first
    pub interventions: Vec<Intervention>,
}

/// Render a confidence score as the forensic label shown on audit rows.
#[must_use]
pub fn confidence_label(confidence: u8) -> &'static str {
    match confidence {
        0..=30 => "SPECULATIVE_FRAGMENTS",
        31..=70 => "CORRELATED_ANOMALY",
        _ => "VERIFIED_C2_FRACTURE",
    }
}

/// Opaque forensic classifier.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Identifier for logs.
    fn name(&self) -> &'static str;

    /// Produce a diagnosis from the triggering sample and recent log
    /// lines.
    ///
    /// # Errors
    /// Implementations report transport, parse and timeout failures via
    /// [`ClassifyError`]; callers are expected to fall back locally.
    async fn analyze(
        &self,
        sample: &TelemetrySample,
        recent_logs: &[String],
    ) -> Result<Diagnosis, ClassifyError>;
}

/// Local signature-matching classifier. Always available; the
/// [`confidence_label`] bands are calibrated to its scores.
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    thresholds: Thresholds,
}

impl HeuristicClassifier {
    /// Build with explicit thresholds.
    #[must_use]
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Build from the sentinel config.
    #[must_use]
    pub fn from_config(config: &SentinelConfig) -> Self {
        Self::new(config.thresholds.clone())
    }

    /// Synchronous core, shared with the async trait impl.
    #[must_use]
    pub fn classify(&self, sample: &TelemetrySample) -> Diagnosis {
        let t = &self.thresholds;
        if sample.cpu < t.deep_zombie_cpu && sample.ram > t.deep_zombie_ram {
            return Diagnosis {
                status: SystemStatus::ZombieKernel,
                stage: FailureStage::Wipeout,
                confidence: 95,
                analysis: format!(
                    "scheduler fully starved (cpu {:.2}%) with resident memory saturated \
                     (ram {:.1}%); parent process is unreaped and climbing",
                    sample.cpu, sample.ram
                ),
                interventions: zombie_interventions(),
            };
        }
        if sample.cpu < t.zombie_cpu && sample.ram > t.classifier_zombie_ram {
            return Diagnosis {
                status: SystemStatus::ZombieKernel,
                stage: FailureStage::Undertow,
                confidence: 75,
                analysis: format!(
                    "cpu starvation (cpu {:.2}%) with elevated resident memory \
                     (ram {:.1}%); consistent with a zombie fracture forming",
                    sample.cpu, sample.ram
                ),
                interventions: zombie_interventions(),
            };
        }
        if sample.cpu > t.strike_cpu {
            return Diagnosis {
                status: SystemStatus::Warning,
                stage: FailureStage::None,
                confidence: 80,
                analysis: format!(
                    "cpu saturation (cpu {:.1}%) with healthy memory; traffic \
                     profile matches an external saturation strike",
                    sample.cpu
                ),
                interventions: strike_interventions(),
            };
        }
        Diagnosis {
            status: SystemStatus::Nominal,
            stage: FailureStage::None,
            confidence: 15,
            analysis: "telemetry inside nominal envelope; no correlated anomaly".to_string(),
            interventions: Vec::new(),
        }
    }
}

#[async_trait]
impl Classifier for HeuristicClassifier {
    fn name(&self) -> &'static str {
        "heuristic-local"
    }

    async fn analyze(
        &self,
        sample: &TelemetrySample,
        _recent_logs: &[String],
    ) -> Result<Diagnosis, ClassifyError> {
        Ok(self.classify(sample))
    }
}

fn zombie_interventions() -> Vec<Intervention> {
    vec![
        Intervention {
            protocol: "HARD_RESET".to_string(),
            action: "Hard reset the instance".to_string(),
            cli_command: "gcloud compute instances reset gcp-p100-node-04 --zone=us-central1-a"
                .to_string(),
            description: "Power-cycle clears the unreaped parent and releases resident memory"
                .to_string(),
            confidence: 95,
        },
        Intervention {
            protocol: "PROC_TERMINATE".to_string(),
            action: "Terminate the zombie parent".to_string(),
            cli_command: "kill -9 $(pgrep -f telemetry-agent)".to_string(),
            description: "Reaps the defunct process tree if PID 1 is still scheduling".to_string(),
            confidence: 70,
        },
        Intervention {
            protocol: "SERVICE_RESTART".to_string(),
            action: "Restart the telemetry agent".to_string(),
            cli_command: "systemctl restart telemetry-agent".to_string(),
            description: "Recovers the agent when the fracture has not reached the kernel"
                .to_string(),
            confidence: 55,
        },
    ]
}

fn strike_interventions() -> Vec<Intervention> {
    vec![
        Intervention {
            protocol: "NET_SHIELD".to_string(),
            action: "Enable SYN flood protection".to_string(),
            cli_command: "sysctl -w net.ipv4.tcp_syncookies=1".to_string(),
            description: "Absorbs half-open connection pressure during the strike".to_string(),
            confidence: 75,
        },
        Intervention {
            protocol: "BAN_SOURCE".to_string(),
            action: "Drop the hostile prefix".to_string(),
            cli_command: "iptables -A INPUT -s 185.220.101.0/24 -j DROP".to_string(),
            description: "Cuts the dominant source observed in the auth log".to_string(),
            confidence: 60,
        },
    ]
}

/// Wraps a primary classifier with the local heuristic. Any primary
/// failure degrades to the heuristic; this seam never returns an error.
pub struct FallbackClassifier {
    primary: Arc<dyn Classifier>,
    heuristic: HeuristicClassifier,
}

impl FallbackClassifier {
    /// Wrap `primary`, falling back to `heuristic` on failure.
    #[must_use]
    pub fn new(primary: Arc<dyn Classifier>, heuristic: HeuristicClassifier) -> Self {
        Self { primary, heuristic }
    }

    /// Run the primary and degrade on error.
    pub async fn analyze(&self, sample: &TelemetrySample, recent_logs: &[String]) -> Diagnosis {
        match self.primary.analyze(sample, recent_logs).await {
            Ok(diagnosis) => diagnosis,
            Err(err) => {
                tracing::warn!(
                    classifier = self.primary.name(),
                    error = %err,
                    "classifier failed, using local heuristic"
                );
                self.heuristic.classify(sample)
            }
        }
    }
}

/// Stand-in for the remote forensic uplink. Delegates to the local
/// heuristic after a simulated round trip so thought latency shows up in
/// the audit trail the way a live uplink's would.
#[derive(Debug, Clone)]
pub struct SimulatedUplink {
    heuristic: HeuristicClassifier,
    latency: Duration,
    fail_with: Option<String>,
}

impl SimulatedUplink {
    /// Default simulated round trip.
    pub const DEFAULT_LATENCY: Duration = Duration::from_millis(1800);

    /// Uplink that answers after [`Self::DEFAULT_LATENCY`].
    #[must_use]
    pub fn new(heuristic: HeuristicClassifier) -> Self {
        Self {
            heuristic,
            latency: Self::DEFAULT_LATENCY,
            fail_with: None,
        }
    }

    /// Override the simulated round trip.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Uplink that always fails with `detail`, for degraded-path tests.
    #[must_use]
    pub fn failing(heuristic: HeuristicClassifier, detail: impl Into<String>) -> Self {
        Self {
            heuristic,
            latency: Duration::from_millis(50),
            fail_with: Some(detail.into()),
        }
    }
}

#[async_trait]
impl Classifier for SimulatedUplink {
    fn name(&self) -> &'static str {
        "simulated-uplink"
    }

    async fn analyze(
        &self,
        sample: &TelemetrySample,
        _recent_logs: &[String],
    ) -> Result<Diagnosis, ClassifyError> {
        tokio::time::sleep(self.latency).await;
        if let Some(detail) = &self.fail_with {
            return Err(ClassifyError::Unavailable(detail.clone()));
        }
        Ok(self.heuristic.classify(sample))
    }
}

/// One archived analysis, as exported for shift handover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForensicReport {
    /// When the analysis ran
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Shift on duty
    pub shift: String,
    /// What initiated the incident
    pub trigger: String,
    /// Label for the peak confidence at analysis time
    pub confidence_label: String,
    /// The analysis text
    pub analysis: String,
}

/// Bounded archive of the most recent analyses.
#[derive(Debug, Clone, Default)]
pub struct ForensicJournal {
    reports: VecDeque<ForensicReport>,
}

impl ForensicJournal {
    /// Empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive a report, evicting the oldest past capacity.
    pub fn push(&mut self, report: ForensicReport) {
        if self.reports.len() == MAX_JOURNAL_REPORTS {
            self.reports.pop_front();
        }
        self.reports.push_back(report);
    }

    /// Archived reports, oldest first.
    #[must_use]
    pub fn reports(&self) -> Vec<ForensicReport> {
        self.reports.iter().cloned().collect()
    }

    /// Number of archived reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// True when nothing has been archived.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Serialize the journal for export.
    ///
    /// # Errors
    /// Returns the underlying serialization error.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(cpu: f64, ram: f64) -> TelemetrySample {
        TelemetrySample::new(Utc::now(), cpu, ram, 150, 2.0)
    }

    fn heuristic() -> HeuristicClassifier {
        HeuristicClassifier::from_config(&SentinelConfig::default())
    }

    #[test]
    fn deep_fracture_scores_ninety_five() {
        let d = heuristic().classify(&sample(1.0, 95.0));
        assert_eq!(d.status, SystemStatus::ZombieKernel);
        assert_eq!(d.stage, FailureStage::Wipeout);
        assert_eq!(d.confidence, 95);
        assert!(!d.interventions.is_empty());
    }

    #[test]
    fn forming_fracture_scores_seventy_five() {
        let d = heuristic().classify(&sample(4.0, 85.0));
        assert_eq!(d.status, SystemStatus::ZombieKernel);
        assert_eq!(d.stage, FailureStage::Undertow);
        assert_eq!(d.confidence, 75);
    }

    #[test]
    fn saturation_strike_scores_eighty() {
        let d = heuristic().classify(&sample(97.0, 55.0));
        assert_eq!(d.status, SystemStatus::Warning);
        assert_eq!(d.confidence, 80);
        assert_eq!(d.interventions[0].protocol, "NET_SHIELD");
    }

    #[test]
    fn nominal_telemetry_scores_fifteen() {
        let d = heuristic().classify(&sample(50.0, 32.0));
        assert_eq!(d.status, SystemStatus::Nominal);
        assert_eq!(d.confidence, 15);
        assert!(d.interventions.is_empty());
    }

    #[test]
    fn confidence_labels_cover_the_score_range() {
        assert_eq!(confidence_label(0), "SPECULATIVE_FRAGMENTS");
        assert_eq!(confidence_label(30), "SPECULATIVE_FRAGMENTS");
        assert_eq!(confidence_label(31), "CORRELATED_ANOMALY");
        assert_eq!(confidence_label(70), "CORRELATED_ANOMALY");
        assert_eq!(confidence_label(71), "VERIFIED_C2_FRACTURE");
        assert_eq!(confidence_label(100), "VERIFIED_C2_FRACTURE");
    }

    struct DeadUplink;

    #[async_trait]
    impl Classifier for DeadUplink {
        fn name(&self) -> &'static str {
            "dead-uplink"
        }

        async fn analyze(
            &self,
            _sample: &TelemetrySample,
            _recent_logs: &[String],
        ) -> Result<Diagnosis, ClassifyError> {
            Err(ClassifyError::Unavailable("uplink down".into()))
        }
    }

    #[tokio::test]
    async fn fallback_degrades_to_the_heuristic() {
        let fallback = FallbackClassifier::new(Arc::new(DeadUplink), heuristic());
        let d = fallback.analyze(&sample(1.0, 95.0), &[]).await;
        assert_eq!(d.status, SystemStatus::ZombieKernel);
        assert_eq!(d.confidence, 95);
    }

    #[tokio::test]
    async fn fallback_passes_primary_success_through() {
        let fallback = FallbackClassifier::new(Arc::new(heuristic()), heuristic());
        let d = fallback.analyze(&sample(50.0, 30.0), &[]).await;
        assert_eq!(d.status, SystemStatus::Nominal);
    }

    #[test]
    fn journal_is_bounded() {
        let mut journal = ForensicJournal::new();
        for i in 0..25 {
            journal.push(ForensicReport {
                timestamp: Utc::now(),
                shift: "1ST_SHIFT".to_string(),
                trigger: "DASHBOARD_MANUAL".to_string(),
                confidence_label: confidence_label(75).to_string(),
                analysis: format!("report {i}"),
            });
        }
        assert_eq!(journal.len(), MAX_JOURNAL_REPORTS);
        let reports = journal.reports();
        assert_eq!(reports.first().map(|r| r.analysis.as_str()), Some("report 5"));
        assert_eq!(reports.last().map(|r| r.analysis.as_str()), Some("report 24"));
        assert!(journal.to_json().unwrap().contains("report 24"));
    }
}
