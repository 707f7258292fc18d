//! Append-only remediation audit log
//!
//! Every completed remediation run and every cooldown-rejected automated
//! trigger lands here as one row. Rows are hash-chained (sha256 over the
//! row fields plus the previous hash) so post-hoc edits are detectable,
//! and the log exposes no mutation beyond `append`.
//!
//! The CSV rendering is the V2 forensic schema consumed by the downstream
//! analysis tooling; the header must match it byte for byte.

use crate::error::AuditError;
use crate::shift::WatchShift;
use crate::types::{IncidentId, SourceTag};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// V2 forensic schema header.
pub const CSV_HEADER: &str = "UTC_DATE,UTC_TIME_PRECISION,UNIX_EPOCH,INCIDENT_UUID,TRIGGER_TYPE,REMEDIATION_TYPE,CPU_PEAK,RAM_PEAK,AI_THOUGHT_LATENCY_SEC,TOTAL_RECOVERY_TIME_SEC,SHIFT_ID,ASSOCIATED_DRILL,GEMINI_HYPOTHESIS_MATCH,AI_FORENSIC_CONFIDENCE,COGNITIVE_LOAD_SCORE,STALL_DETECTED,QUEUE_DELAY_SEC,IS_ADVERSARY_MODE,LATENCY_HUMAN_ACTION_SEC";

/// Trigger label written to rejected-trigger rows.
pub const REJECTED_TRIGGER_LABEL: &str = "AUTOMATED_HEURISTIC_TRIGGER";

/// Who executed the remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemediationType {
    /// A human committed the action
    ManualOperator,
    /// The sentinel acted autonomously
    SentinelAi,
}

impl RemediationType {
    /// Wire name for the CSV column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManualOperator => "MANUAL_OPERATOR",
            Self::SentinelAi => "SENTINEL_AI",
        }
    }
}

/// Cognitive-load heuristic: fully autonomous fail-safe action scores the
/// maximum (nobody was watching), a sub-minute human response scores the
/// minimum, anything else is the staffed baseline.
#[must_use]
pub fn cognitive_load(source: SourceTag, total_recovery_secs: f64) -> u8 {
    if source == SourceTag::AutoSentinelFailsafe {
        10
    } else if total_recovery_secs > 0.0 && total_recovery_secs < 60.0 {
        1
    } else {
        5
    }
}

/// Sample vitals frozen into a row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalsAtTrigger {
    /// CPU percent at the triggering sample
    pub cpu: f64,
    /// RAM percent at the triggering sample
    pub ram: f64,
}

/// One audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Row timestamp
    pub timestamp: DateTime<Utc>,
    /// Incident the row belongs to
    pub incident: IncidentId,
    /// Originating source
    pub source: SourceTag,
    /// TRIGGER_TYPE column: `AUTO`, `MANUAL`, or the rejected label
    pub trigger_label: String,
    /// Who executed
    pub remediation_type: RemediationType,
    /// Vitals at the triggering sample
    pub vitals: VitalsAtTrigger,
    /// Classifier thinking time, seconds
    pub thought_latency_secs: f64,
    /// Detection to completion, seconds
    pub total_recovery_secs: f64,
    /// Shift on duty
    pub shift: WatchShift,
    /// Row belongs to a scheduled drill
    pub drill: bool,
    /// Classifier hypothesis agreed with the injected pattern
    pub hypothesis_match: bool,
    /// Peak classifier confidence for the incident
    pub forensic_confidence: u8,
    /// Cognitive-load score
    pub cognitive_load: u8,
    /// Telemetry stall advisory was raised during the incident
    pub stall_detected: bool,
    /// Time the trigger spent queued, seconds
    pub queue_delay_secs: f64,
    /// Adversary-emulation source
    pub adversary_mode: bool,
    /// Detection to human decision, seconds (zero for autonomous runs)
    pub human_latency_secs: f64,
    /// Hash of the previous row
    pub prev_hash: [u8; 32],
    /// Hash of this row
    pub hash: [u8; 32],
}

impl AuditRecord {
    /// TRIGGER_TYPE label for a completed run.
    #[must_use]
    pub fn trigger_label_for(source: SourceTag) -> &'static str {
        if source.is_automated() {
            "AUTO"
        } else {
            "MANUAL"
        }
    }

    /// Render this row in the V2 CSV schema.
    #[must_use]
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{:.1},{:.1},{:.2},{:.2},{},{},{},{},{},{},{:.2},{},{:.2}",
            self.timestamp.format("%Y-%m-%d"),
            self.timestamp.format("%H:%M:%S%.3f"),
            self.timestamp.timestamp(),
            self.incident.forensic_code(),
            self.trigger_label,
            self.remediation_type.as_str(),
            self.vitals.cpu,
            self.vitals.ram,
            self.thought_latency_secs,
            self.total_recovery_secs,
            self.shift.as_str(),
            self.drill,
            self.hypothesis_match,
            self.forensic_confidence,
            self.cognitive_load,
            self.stall_detected,
            self.queue_delay_secs,
            self.adversary_mode,
            self.human_latency_secs,
        )
    }
}

/// Append-only, hash-chained audit log.
#[derive(Debug, Default)]
pub struct AuditLog {
    inner: Mutex<Vec<AuditRecord>>,
}

impl AuditLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row, chaining it to the previous one. Returns the row
    /// index.
    pub fn append(&self, mut record: AuditRecord) -> usize {
        let mut guard = self.inner.lock();
        record.prev_hash = guard.last().map_or([0u8; 32], |r| r.hash);
        record.hash = compute_hash(&record);
        tracing::info!(
            incident = %record.incident,
            trigger = %record.trigger_label,
            remediation = record.remediation_type.as_str(),
            row = guard.len(),
            "audit row appended"
        );
        guard.push(record);
        guard.len() - 1
    }

    /// Snapshot of all rows, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.inner.lock().clone()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when no rows have been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Walk the chain and verify every link and row hash.
    ///
    /// # Errors
    /// Returns [`AuditError::ChainCorrupted`] at the first bad row.
    pub fn verify_integrity(&self) -> Result<(), AuditError> {
        let guard = self.inner.lock();
        let mut prev = [0u8; 32];
        for (index, record) in guard.iter().enumerate() {
            if record.prev_hash != prev {
                return Err(AuditError::ChainCorrupted { index });
            }
            if record.hash != compute_hash(record) {
                return Err(AuditError::ChainCorrupted { index });
            }
            prev = record.hash;
        }
        Ok(())
    }

    /// Render the whole log in the V2 CSV schema.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let guard = self.inner.lock();
        let mut out = String::with_capacity((guard.len() + 1) * 160);
        out.push_str(CSV_HEADER);
        out.push('\n');
        for record in guard.iter() {
            out.push_str(&record.to_csv_row());
            out.push('\n');
        }
        out
    }

    /// Write the CSV rendering to `path`. The chain is verified first so
    /// a tampered log can never masquerade as a clean export. Returns the
    /// number of data rows.
    ///
    /// # Errors
    /// Returns [`AuditError::ChainCorrupted`] for a bad chain and
    /// [`AuditError::Export`] on IO failure.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<usize, AuditError> {
        self.verify_integrity()?;
        let csv = self.to_csv();
        std::fs::write(path, csv)?;
        Ok(self.len())
    }

    #[cfg(test)]
    fn tamper(&self, index: usize, confidence: u8) {
        self.inner.lock()[index].forensic_confidence = confidence;
    }
}

fn compute_hash(record: &AuditRecord) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(record.timestamp.timestamp_millis().to_le_bytes());
    hasher.update(record.incident.0.as_bytes());
    hasher.update(record.source.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(record.trigger_label.as_bytes());
    hasher.update([0]);
    hasher.update(record.remediation_type.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(record.vitals.cpu.to_le_bytes());
    hasher.update(record.vitals.ram.to_le_bytes());
    hasher.update(record.thought_latency_secs.to_le_bytes());
    hasher.update(record.total_recovery_secs.to_le_bytes());
    hasher.update([record.shift.id()]);
    hasher.update([u8::from(record.drill)]);
    hasher.update([u8::from(record.hypothesis_match)]);
    hasher.update([record.forensic_confidence]);
    hasher.update([record.cognitive_load]);
    hasher.update([u8::from(record.stall_detected)]);
    hasher.update(record.queue_delay_secs.to_le_bytes());
    hasher.update([u8::from(record.adversary_mode)]);
    hasher.update(record.human_latency_secs.to_le_bytes());
    hasher.update(record.prev_hash);
    hasher.finalize().into()
}
