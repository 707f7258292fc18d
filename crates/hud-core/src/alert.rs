//! Alert broadcaster
//!
//! Fans incident notifications out to every configured channel in
//! parallel. Channels are opaque behind [`AlertChannel`]; this simulation
//! core ships simulated transports only. Two hard rules:
//!
//! - a broadcast never returns an error and never blocks remediation
//! - an unconfigured or failing transport degrades to a simulated-failover
//!   outcome instead of failing the broadcast
//!
//! A genuinely hard channel failure is still visible: it degrades the
//! uplink health, which the runtime heartbeat then probes until recovery.

use crate::types::{IncidentId, SystemStatus};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

/// Notification payload.
#[derive(Debug, Clone)]
pub struct AlertMessage {
    /// Headline
    pub title: String,
    /// Body text
    pub body: String,
    /// Status at send time
    pub status: SystemStatus,
    /// Incident the alert refers to, when bound to one
    pub incident: Option<IncidentId>,
}

impl AlertMessage {
    /// Incident-bound alert.
    #[must_use]
    pub fn incident(incident: IncidentId, status: SystemStatus, body: impl Into<String>) -> Self {
        Self {
            title: format!("[KING-HUD] {} {}", incident.forensic_code(), status.as_str()),
            body: body.into(),
            status,
            incident: Some(incident),
        }
    }

    /// Uplink heartbeat probe.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self {
            title: "[KING-HUD] uplink heartbeat".to_string(),
            body: "heartbeat probe".to_string(),
            status: SystemStatus::UplinkReconnecting,
            incident: None,
        }
    }
}

/// Result of one channel send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOutcome {
    /// The message reached (or is deemed to have reached) the operator
    pub delivered: bool,
    /// Delivery was simulated rather than real
    pub simulated: bool,
    /// Transport detail for the log line
    pub detail: String,
}

impl ChannelOutcome {
    /// Real delivery.
    #[must_use]
    pub fn delivered(detail: impl Into<String>) -> Self {
        Self {
            delivered: true,
            simulated: false,
            detail: detail.into(),
        }
    }

    /// Simulated failover: transport unavailable, treated as success.
    #[must_use]
    pub fn simulated_failover(detail: impl Into<String>) -> Self {
        Self {
            delivered: true,
            simulated: true,
            detail: format!("SIMULATED_FAILOVER: {}", detail.into()),
        }
    }

    /// Hard failure: transport configured but down.
    #[must_use]
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            delivered: false,
            simulated: false,
            detail: detail.into(),
        }
    }
}

/// Opaque notification transport.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Transport name for logs and summaries.
    fn name(&self) -> &'static str;

    /// Deliver one message. Implementations must not panic; failures are
    /// reported through the outcome.
    async fn send(&self, message: &AlertMessage) -> ChannelOutcome;
}

/// Behavior of a [`SimulatedChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedMode {
    /// Pretend the transport is configured and delivery succeeds
    Deliver,
    /// Transport unconfigured; report simulated failover
    Failover,
    /// Transport configured but hard-down
    HardFail,
}

/// Scriptable in-process transport.
#[derive(Debug, Clone)]
pub struct SimulatedChannel {
    name: &'static str,
    mode: SimulatedMode,
}

impl SimulatedChannel {
    /// Channel that reports real delivery.
    #[must_use]
    pub fn deliver(name: &'static str) -> Self {
        Self {
            name,
            mode: SimulatedMode::Deliver,
        }
    }

    /// Channel that degrades to simulated failover.
    #[must_use]
    pub fn failover(name: &'static str) -> Self {
        Self {
            name,
            mode: SimulatedMode::Failover,
        }
    }

    /// Channel that hard-fails every send.
    #[must_use]
    pub fn hard_fail(name: &'static str) -> Self {
        Self {
            name,
            mode: SimulatedMode::HardFail,
        }
    }
}

#[async_trait]
impl AlertChannel for SimulatedChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(&self, message: &AlertMessage) -> ChannelOutcome {
        match self.mode {
            SimulatedMode::Deliver => ChannelOutcome::delivered(format!("sent '{}'", message.title)),
            SimulatedMode::Failover => {
                ChannelOutcome::simulated_failover(format!("{} not configured", self.name))
            }
            SimulatedMode::HardFail => ChannelOutcome::failed(format!("{} transport down", self.name)),
        }
    }
}

/// Aggregated broadcast result.
#[derive(Debug, Clone)]
pub struct AlertSummary {
    /// Per-channel outcomes, in channel order
    pub outcomes: Vec<(&'static str, ChannelOutcome)>,
}

impl AlertSummary {
    /// At least one configured transport hard-failed.
    #[must_use]
    pub fn uplink_degraded(&self) -> bool {
        self.outcomes.iter().any(|(_, o)| !o.delivered)
    }

    /// Every outcome was a simulated failover.
    #[must_use]
    pub fn all_simulated(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|(_, o)| o.simulated)
    }

    /// Uplink health implied by this broadcast.
    #[must_use]
    pub fn uplink_health(&self) -> UplinkHealth {
        if self.uplink_degraded() {
            UplinkHealth::Failure
        } else if self.all_simulated() {
            UplinkHealth::Simulation
        } else {
            UplinkHealth::Nominal
        }
    }
}

/// Health of the notification uplink as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkHealth {
    /// All transports delivered
    Nominal,
    /// Running on simulated failover only
    Simulation,
    /// At least one configured transport is down
    Failure,
    /// Heartbeat probing after a failure
    Reconnecting,
}

impl UplinkHealth {
    /// Status surfaced on the HUD for this health level.
    #[must_use]
    pub fn as_status(self) -> Option<SystemStatus> {
        match self {
            Self::Nominal => None,
            Self::Simulation => Some(SystemStatus::UplinkSimulation),
            Self::Failure => Some(SystemStatus::UplinkFailure),
            Self::Reconnecting => Some(SystemStatus::UplinkReconnecting),
        }
    }
}

/// Fan-out broadcaster over the configured channels.
pub struct AlertBroadcaster {
    channels: Vec<Arc<dyn AlertChannel>>,
}

impl AlertBroadcaster {
    /// Build from explicit channels.
    #[must_use]
    pub fn new(channels: Vec<Arc<dyn AlertChannel>>) -> Self {
        Self { channels }
    }

    /// The standard trio: push gateway, email relay, SMS bridge, all in
    /// simulated-failover mode (no transport credentials in this core).
    #[must_use]
    pub fn standard() -> Self {
        Self::new(vec![
            Arc::new(SimulatedChannel::failover("push-gateway")),
            Arc::new(SimulatedChannel::failover("email-relay")),
            Arc::new(SimulatedChannel::failover("sms-bridge")),
        ])
    }

    /// Number of configured channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Send `message` on every channel concurrently. Infallible.
    pub async fn broadcast(&self, message: &AlertMessage) -> AlertSummary {
        let sends = self.channels.iter().map(|c| {
            let channel = Arc::clone(c);
            async move { (channel.name(), channel.send(message).await) }
        });
        let outcomes: Vec<(&'static str, ChannelOutcome)> = join_all(sends).await;

        for (name, outcome) in &outcomes {
            if outcome.delivered {
                tracing::info!(channel = name, simulated = outcome.simulated, detail = %outcome.detail, "alert dispatched");
            } else {
                tracing::warn!(channel = name, detail = %outcome.detail, "alert channel hard failure");
            }
        }
        AlertSummary { outcomes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> AlertMessage {
        AlertMessage::incident(
            IncidentId::new(),
            SystemStatus::ZombieKernel,
            "fracture confirmed",
        )
    }

    #[tokio::test]
    async fn standard_trio_degrades_to_simulated_success() {
        let broadcaster = AlertBroadcaster::standard();
        let summary = broadcaster.broadcast(&message()).await;
        assert_eq!(summary.outcomes.len(), 3);
        assert!(summary.all_simulated());
        assert!(!summary.uplink_degraded());
        assert_eq!(summary.uplink_health(), UplinkHealth::Simulation);
        for (_, outcome) in &summary.outcomes {
            assert!(outcome.delivered);
            assert!(outcome.detail.starts_with("SIMULATED_FAILOVER"));
        }
    }

    #[tokio::test]
    async fn hard_failure_degrades_uplink_health_only() {
        let broadcaster = AlertBroadcaster::new(vec![
            Arc::new(SimulatedChannel::deliver("push-gateway")),
            Arc::new(SimulatedChannel::hard_fail("email-relay")),
        ]);
        let summary = broadcaster.broadcast(&message()).await;
        assert!(summary.uplink_degraded());
        assert_eq!(summary.uplink_health(), UplinkHealth::Failure);
        // The healthy channel still delivered.
        assert!(summary.outcomes.iter().any(|(n, o)| *n == "push-gateway" && o.delivered));
    }

    #[tokio::test]
    async fn clean_delivery_reports_nominal_uplink() {
        let broadcaster =
            AlertBroadcaster::new(vec![Arc::new(SimulatedChannel::deliver("push-gateway"))]);
        let summary = broadcaster.broadcast(&message()).await;
        assert_eq!(summary.uplink_health(), UplinkHealth::Nominal);
        assert!(!summary.all_simulated());
    }

    #[test]
    fn uplink_health_maps_to_hud_status() {
        assert_eq!(UplinkHealth::Nominal.as_status(), None);
        assert_eq!(
            UplinkHealth::Failure.as_status(),
            Some(SystemStatus::UplinkFailure)
        );
        assert_eq!(
            UplinkHealth::Reconnecting.as_status(),
            Some(SystemStatus::UplinkReconnecting)
        );
    }
}
