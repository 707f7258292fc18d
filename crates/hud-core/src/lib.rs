//! HUD Core - incident remediation state machine
//!
//! The sentinel core behind the KING-HUD console:
//! - Watches fabricated telemetry for fracture signatures
//! - Confirms incidents after consecutive bad ticks
//! - Gates remediation behind a forensic hold and fail-safe countdown
//! - Serializes colliding strikes through a FIFO queue
//! - Records every remediation in a hash-chained audit log
//!
//! # Example
//!
//! ```rust,ignore
//! use hud_core::{RuntimeDeps, SentinelConfig, SentinelRuntime, SourceTag};
//!
//! # async fn example() -> Result<(), hud_core::HudError> {
//! let (handle, _task) = SentinelRuntime::spawn(SentinelConfig::default(), RuntimeDeps::default());
//!
//! handle.trigger_strike(SourceTag::DashboardManual).await?;
//! let snapshot = handle.snapshot().await?;
//!
//! println!("phase: {}", snapshot.phase);
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod alert;
pub mod audit;
pub mod bus;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod error;
pub mod executor;
pub mod phase;
pub mod runtime;
pub mod shift;
pub mod traffic;
pub mod types;

// Re-exports for convenience
pub use alert::{AlertBroadcaster, AlertChannel, AlertMessage, AlertSummary, ChannelOutcome, UplinkHealth};
pub use audit::{AuditLog, AuditRecord, RemediationType, VitalsAtTrigger, CSV_HEADER};
pub use bus::{SignalKind, StrikeBus, StrikeSignal, C2_CHANNEL};
pub use classifier::{
    confidence_label, Classifier, Diagnosis, FailureStage, ForensicJournal, ForensicReport,
    HeuristicClassifier, Intervention, SimulatedUplink,
};
pub use config::{ResetTarget, SentinelConfig, Thresholds};
pub use coordinator::{Action, ExecutionTicket, IncidentCoordinator, TriggerOutcome};
pub use detector::{DetectorEdge, FractureDetector, StallEdge, StallMonitor};
pub use error::{
    AuditError, ClassifyError, ConfigError, ExecuteError, HudError, PhaseError, RuntimeError,
    TriggerError,
};
pub use executor::{PipelineBridge, ResetApi, SimulatedPipelineBridge, SimulatedResetApi};
pub use phase::{allowed_transitions, validate_transition, PhaseController, PhaseEvent};
pub use runtime::{RuntimeDeps, SentinelHandle, SentinelRuntime, TriggerReceipt};
pub use shift::{DrillScheduler, WatchShift};
pub use traffic::{StrikeDisposition, TrafficController};
pub use types::{
    HudSnapshot, IncidentId, IncidentState, RemediationPhase, SourceTag, StrikeQueueEntry,
    SystemStatus,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the sentinel core
    pub use crate::{
        HudError, HudSnapshot, IncidentCoordinator, IncidentId, RemediationPhase, RuntimeDeps,
        SentinelConfig, SentinelHandle, SentinelRuntime, SourceTag, SystemStatus, TriggerReceipt,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn runtime_spawns_and_reports_idle() {
        let (handle, join) = SentinelRuntime::spawn(SentinelConfig::default(), RuntimeDeps::default());
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, RemediationPhase::Idle);
        assert!(!snapshot.active);
        handle.shutdown().await.unwrap();
        join.await.unwrap();
    }

    #[test]
    fn coordinator_wires_the_whole_core() {
        use chrono::TimeZone;
        let wall = chrono::Utc.with_ymd_and_hms(2025, 6, 10, 18, 0, 0).unwrap();
        let mut coordinator = IncidentCoordinator::new(
            SentinelConfig::default(),
            Arc::new(AuditLog::new()),
            StrikeBus::default(),
        );
        let t0 = Instant::now();
        for i in 0..3 {
            let sample = hud_telemetry::TelemetrySample::new(wall, 1.0, 95.0, 200, 0.5);
            coordinator.observe(&sample, t0 + Duration::from_secs(i), wall);
        }
        let snapshot = coordinator.snapshot(t0 + Duration::from_secs(2));
        assert!(snapshot.active);
        assert_eq!(snapshot.phase, RemediationPhase::Hold);
    }
}
