//! Cross-context strike bus
//!
//! Fan-out channel carrying strike lifecycle signals between contexts
//! (console sessions, admin panes, the runtime itself). Delivery is
//! at-least-once and unordered from the receivers' point of view;
//! consumers apply signals idempotently and converge on last-write-wins,
//! so duplicates and races are harmless.

use crate::types::{IncidentId, SourceTag};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Logical channel name, shared by every context of one deployment.
pub const C2_CHANNEL: &str = "king_hud_c2_channel";

/// Default buffered signals per subscriber.
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// Lifecycle signal kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    /// A strike was injected somewhere
    Triggered,
    /// The incident was remediated or recovered
    Cleared,
}

impl SignalKind {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Triggered => "TRIGGER_ZOMBIE",
            Self::Cleared => "STRIKE_CLEARED_GLOBAL",
        }
    }
}

/// One signal on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrikeSignal {
    /// What happened
    pub kind: SignalKind,
    /// Originating context
    pub source: SourceTag,
    /// Incident the signal refers to, when known
    pub incident: Option<IncidentId>,
}

impl StrikeSignal {
    /// A trigger signal from `source`.
    #[must_use]
    pub fn triggered(source: SourceTag) -> Self {
        Self {
            kind: SignalKind::Triggered,
            source,
            incident: None,
        }
    }

    /// A clear signal for `incident` from `source`.
    #[must_use]
    pub fn cleared(source: SourceTag, incident: Option<IncidentId>) -> Self {
        Self {
            kind: SignalKind::Cleared,
            source,
            incident,
        }
    }
}

/// Broadcast handle. Cheap to clone; all clones share the channel.
#[derive(Debug, Clone)]
pub struct StrikeBus {
    tx: broadcast::Sender<StrikeSignal>,
}

impl StrikeBus {
    /// Create a bus buffering `capacity` signals per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a signal. Returns the number of contexts that received it;
    /// zero subscribers is not an error.
    pub fn publish(&self, signal: StrikeSignal) -> usize {
        let kind = signal.kind.as_str();
        let source = signal.source;
        match self.tx.send(signal) {
            Ok(n) => {
                tracing::debug!(kind, source = %source, receivers = n, "strike signal published");
                n
            }
            Err(_) => {
                tracing::debug!(kind, source = %source, "strike signal published to empty bus");
                0
            }
        }
    }

    /// Subscribe a new context. Only signals published after this call are
    /// delivered.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StrikeSignal> {
        self.tx.subscribe()
    }
}

impl Default for StrikeBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signals_fan_out_to_every_subscriber() {
        let bus = StrikeBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let sent = bus.publish(StrikeSignal::triggered(SourceTag::AdminRemoteStrike));
        assert_eq!(sent, 2);

        let got_a = a.recv().await.unwrap();
        let got_b = b.recv().await.unwrap();
        assert_eq!(got_a, got_b);
        assert_eq!(got_a.kind, SignalKind::Triggered);
        assert_eq!(got_a.source, SourceTag::AdminRemoteStrike);
    }

    #[tokio::test]
    async fn publishing_to_an_empty_bus_is_not_an_error() {
        let bus = StrikeBus::default();
        assert_eq!(bus.publish(StrikeSignal::cleared(SourceTag::Unknown, None)), 0);
    }

    #[tokio::test]
    async fn late_subscribers_only_see_later_signals() {
        let bus = StrikeBus::default();
        bus.publish(StrikeSignal::triggered(SourceTag::RedTeamManual));

        let mut late = bus.subscribe();
        let id = IncidentId::new();
        bus.publish(StrikeSignal::cleared(SourceTag::DashboardManual, Some(id)));

        let got = late.recv().await.unwrap();
        assert_eq!(got.kind, SignalKind::Cleared);
        assert_eq!(got.incident, Some(id));
    }

    #[test]
    fn wire_names_match_the_channel_contract() {
        assert_eq!(SignalKind::Triggered.as_str(), "TRIGGER_ZOMBIE");
        assert_eq!(SignalKind::Cleared.as_str(), "STRIKE_CLEARED_GLOBAL");
        assert_eq!(C2_CHANNEL, "king_hud_c2_channel");
    }
}
