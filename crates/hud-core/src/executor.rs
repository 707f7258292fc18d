//! Actuation seams
//!
//! The executor path touches the outside world in two places: the cloud
//! reset API that power-cycles the target instance, and the CI pipeline
//! bridge that carries the chosen remediation command. Both are opaque
//! traits here; the shipped implementations simulate latency and outcomes
//! so the whole remediation cycle runs without credentials.
//!
//! The reset call is load-bearing: its failure is fatal to the cycle. The
//! pipeline bridge is fire-and-forget: failures are logged and never block
//! or fail remediation.

use crate::config::ResetTarget;
use crate::error::ExecuteError;
use async_trait::async_trait;
use std::time::Duration;

/// Default simulated reset latency.
pub const DEFAULT_RESET_LATENCY: Duration = Duration::from_secs(3);

/// Cloud instance reset seam.
#[async_trait]
pub trait ResetApi: Send + Sync {
    /// Implementation name for logs.
    fn name(&self) -> &'static str;

    /// Power-cycle the target instance.
    ///
    /// # Errors
    /// Returns [`ExecuteError::ResetFailed`] when the instance could not
    /// be reset. Callers treat this as fatal; there is no automatic retry.
    async fn reset_instance(&self, target: &ResetTarget) -> Result<(), ExecuteError>;
}

/// Simulated reset API with configurable latency and a scriptable failure.
#[derive(Debug, Clone)]
pub struct SimulatedResetApi {
    latency: Duration,
    fail_with: Option<String>,
}

impl SimulatedResetApi {
    /// Successful resets at the default latency.
    #[must_use]
    pub fn new() -> Self {
        Self {
            latency: DEFAULT_RESET_LATENCY,
            fail_with: None,
        }
    }

    /// Successful resets at a custom latency.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            fail_with: None,
        }
    }

    /// Every reset fails with `detail` (still after the latency).
    #[must_use]
    pub fn failing(detail: impl Into<String>) -> Self {
        Self {
            latency: Duration::from_millis(50),
            fail_with: Some(detail.into()),
        }
    }
}

impl Default for SimulatedResetApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResetApi for SimulatedResetApi {
    fn name(&self) -> &'static str {
        "simulated-reset"
    }

    async fn reset_instance(&self, target: &ResetTarget) -> Result<(), ExecuteError> {
        tracing::info!(target = %target.resource_path(), "instance reset issued");
        tokio::time::sleep(self.latency).await;
        match &self.fail_with {
            None => {
                tracing::info!(target = %target.instance, "instance reset acknowledged");
                Ok(())
            }
            Some(detail) => {
                tracing::error!(target = %target.instance, detail = %detail, "instance reset failed");
                Err(ExecuteError::ResetFailed(detail.clone()))
            }
        }
    }
}

/// Result of a pipeline trigger attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOutcome {
    /// The pipeline accepted the trigger
    pub accepted: bool,
    /// The trigger was simulated rather than real
    pub simulated: bool,
    /// Transport detail for the log line
    pub detail: String,
}

/// CI pipeline seam carrying the remediation command.
#[async_trait]
pub trait PipelineBridge: Send + Sync {
    /// Implementation name for logs.
    fn name(&self) -> &'static str;

    /// Queue a pipeline run for `command`. Must not panic; failures are
    /// reported through the outcome and never propagate to the executor.
    async fn trigger(&self, command: &str) -> BridgeOutcome;
}

/// Simulated pipeline bridge: always accepts, always simulated.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPipelineBridge;

#[async_trait]
impl PipelineBridge for SimulatedPipelineBridge {
    fn name(&self) -> &'static str {
        "simulated-pipeline"
    }

    async fn trigger(&self, command: &str) -> BridgeOutcome {
        tracing::info!(command, "actuation pipeline trigger queued (simulated)");
        BridgeOutcome {
            accepted: true,
            simulated: true,
            detail: format!("simulated pipeline run for '{command}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn target() -> ResetTarget {
        ResetTarget::default()
    }

    #[tokio::test]
    async fn simulated_reset_succeeds_after_latency() {
        let api = SimulatedResetApi::with_latency(Duration::from_millis(30));
        let started = Instant::now();
        api.reset_instance(&target()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn failing_reset_reports_the_detail() {
        let api = SimulatedResetApi::failing("api 503");
        let err = api.reset_instance(&target()).await.unwrap_err();
        assert_eq!(err, ExecuteError::ResetFailed("api 503".to_string()));
    }

    #[tokio::test]
    async fn pipeline_bridge_never_fails_the_caller() {
        let bridge = SimulatedPipelineBridge;
        let outcome = bridge
            .trigger("gcloud compute instances reset gcp-p100-node-04")
            .await;
        assert!(outcome.accepted);
        assert!(outcome.simulated);
    }
}
