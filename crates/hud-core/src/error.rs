//! Error taxonomy for the incident core
//!
//! Grouped per failure domain with an umbrella [`HudError`] at the top.
//! Classifier and alert failures are soft (the incident path degrades and
//! continues); reset failures and audit corruption page the operator.

use crate::types::RemediationPhase;
use std::time::Duration;
use thiserror::Error;

/// Strike trigger rejections.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// Automated trigger landed inside the reset cooldown window.
    #[error("reset cooldown active for another {remaining_secs}s")]
    CooldownActive {
        /// Seconds until the governor releases
        remaining_secs: u64,
    },
}

/// Remediation execution failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecuteError {
    /// Commit arrived with nothing to remediate.
    #[error("no active incident to remediate")]
    NothingActive,

    /// The in-flight guard blocked a second concurrent cycle.
    #[error("remediation already in flight")]
    AlreadyExecuting,

    /// The reset seam reported failure. Fatal and user-visible; the
    /// incident stays active and there is no automatic retry.
    #[error("instance reset failed: {0}")]
    ResetFailed(String),
}

/// Classifier seam failures. Always recoverable: the local heuristic
/// fallback takes over.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// Remote classifier unreachable or unconfigured.
    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    /// Response could not be interpreted.
    #[error("classifier returned malformed analysis: {0}")]
    Malformed(String),

    /// No response inside the deadline.
    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),
}

/// Audit log failures.
#[derive(Error, Debug)]
pub enum AuditError {
    /// Hash chain verification failed.
    #[error("audit chain corrupted at row {index}")]
    ChainCorrupted {
        /// Index of the first bad row
        index: usize,
    },

    /// CSV export could not be written.
    #[error("audit export failed: {0}")]
    Export(#[from] std::io::Error),
}

/// Configuration validation and load failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A duration or count field must be greater than zero.
    #[error("{field} must be positive")]
    NonPositive {
        /// Offending field name
        field: &'static str,
    },

    /// Fracture and recovery signatures must not overlap.
    #[error("zombie and recovery signatures overlap: {detail}")]
    SignatureOverlap {
        /// What overlaps
        detail: String,
    },

    /// Config file unreadable.
    #[error("config file unreadable: {0}")]
    Io(#[from] std::io::Error),

    /// Config file failed to parse.
    #[error("config file malformed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runtime actor communication failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeError {
    /// Command channel closed: the runtime task has shut down.
    #[error("sentinel runtime is not running")]
    ChannelClosed,
}

/// Lifecycle transition violations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseError {
    /// Transition not present in the lifecycle matrix.
    #[error("invalid phase transition {from} -> {to}")]
    InvalidTransition {
        /// Phase the controller was in
        from: RemediationPhase,
        /// Phase that was requested
        to: RemediationPhase,
    },
}

/// Umbrella error for the incident core.
#[derive(Error, Debug)]
pub enum HudError {
    /// Trigger rejected
    #[error("trigger rejected: {0}")]
    Trigger(#[from] TriggerError),

    /// Remediation failed
    #[error("remediation failed: {0}")]
    Execute(#[from] ExecuteError),

    /// Classification failed
    #[error("classification failed: {0}")]
    Classify(#[from] ClassifyError),

    /// Audit log error
    #[error("audit log error: {0}")]
    Audit(#[from] AuditError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Lifecycle violation
    #[error("lifecycle error: {0}")]
    Phase(#[from] PhaseError),

    /// Runtime actor unavailable
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl HudError {
    /// True when the system keeps operating after this error (degraded
    /// classification, rejected trigger). False means the incident path
    /// itself failed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Trigger(_) | Self::Classify(_))
    }

    /// True when the error must be surfaced to a human immediately:
    /// failed resets leave an active incident behind, and a corrupted
    /// audit chain invalidates the forensic record.
    #[must_use]
    pub fn requires_operator(&self) -> bool {
        matches!(
            self,
            Self::Execute(ExecuteError::ResetFailed(_)) | Self::Audit(AuditError::ChainCorrupted { .. })
        )
    }
}
