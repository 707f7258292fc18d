//! Strike traffic controller
//!
//! Serializes strike requests from every context (operator consoles, admin
//! contexts, schedulers) so at most one remediation cycle runs at a time.
//! Requests that land while the governor is busy are parked in a FIFO
//! queue: never dropped, never reordered, duplicates allowed. After the
//! governor frees, the queue drains one entry per settle window so the
//! telemetry baseline re-establishes between injected incidents.

use crate::config::SentinelConfig;
use crate::types::{SourceTag, StrikeQueueEntry};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Outcome of a strike request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrikeDisposition {
    /// Governor was free; the caller owns it now
    Dispatched,
    /// Governor busy; parked at the tail
    Queued {
        /// Queue depth including this entry
        depth: usize,
    },
}

/// FIFO governor over strike injection.
#[derive(Debug, Clone)]
pub struct TrafficController {
    busy: bool,
    queue: VecDeque<StrikeQueueEntry>,
    settle: Duration,
    freed_at: Option<Instant>,
}

impl TrafficController {
    /// Build a controller with an explicit settle window.
    #[must_use]
    pub fn new(settle: Duration) -> Self {
        Self {
            busy: false,
            queue: VecDeque::new(),
            settle,
            freed_at: None,
        }
    }

    /// Build a controller from the sentinel config.
    #[must_use]
    pub fn from_config(config: &SentinelConfig) -> Self {
        Self::new(config.settle_delay())
    }

    /// Request a strike slot. Dispatching takes the governor immediately;
    /// the caller must eventually release it via [`Self::set_busy`].
    pub fn request(&mut self, source: SourceTag, now: Instant, wall: DateTime<Utc>) -> StrikeDisposition {
        if self.busy {
            let entry = StrikeQueueEntry::new(source, now, wall);
            self.queue.push_back(entry);
            let depth = self.queue.len();
            tracing::info!(source = %source, depth, "governor busy, strike queued");
            return StrikeDisposition::Queued { depth };
        }
        self.busy = true;
        self.freed_at = None;
        tracing::info!(source = %source, "strike dispatched");
        StrikeDisposition::Dispatched
    }

    /// Synchronize the governor with the coordinator's busy computation
    /// (incident active, classifier in flight, or remediation in flight).
    /// The busy-to-free transition starts the settle clock.
    pub fn set_busy(&mut self, busy: bool, now: Instant) {
        if busy == self.busy {
            return;
        }
        self.busy = busy;
        if busy {
            self.freed_at = None;
        } else {
            self.freed_at = Some(now);
            if !self.queue.is_empty() {
                tracing::info!(
                    depth = self.queue.len(),
                    settle_secs = self.settle.as_secs(),
                    "governor freed, queued strikes drain after settle"
                );
            }
        }
    }

    /// Pop the next queued strike once the governor has been free for the
    /// full settle window. Popping takes the governor again.
    pub fn poll_dispatch(&mut self, now: Instant) -> Option<StrikeQueueEntry> {
        if self.busy || self.queue.is_empty() {
            return None;
        }
        let freed = self.freed_at?;
        if now.duration_since(freed) < self.settle {
            return None;
        }
        let entry = self.queue.pop_front()?;
        self.busy = true;
        self.freed_at = None;
        tracing::info!(
            source = %entry.source,
            waited_secs = now.duration_since(entry.enqueued_at).as_secs(),
            remaining = self.queue.len(),
            "queued strike dispatched"
        );
        Some(entry)
    }

    /// Governor currently held.
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Entries parked behind the governor.
    #[inline]
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Iterate parked entries, head first.
    pub fn iter_queued(&self) -> impl Iterator<Item = &StrikeQueueEntry> {
        self.queue.iter()
    }
}
