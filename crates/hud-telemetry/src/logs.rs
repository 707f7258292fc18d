//! Synthetic kernel log feed
//!
//! A bounded window of fabricated log lines, one pool per signal regime.
//! The classifier seam receives the most recent lines as context.

use crate::generator::SignalPattern;
use std::collections::VecDeque;

/// Default number of retained log lines.
pub const DEFAULT_LOG_LINES: usize = 200;

/// Healthy-baseline kernel chatter.
const NOMINAL_LINES: &[&str] = &[
    "kernel: [watchdog] heartbeat acknowledged, all cores responsive",
    "systemd[1]: run-telemetry-export.service: Succeeded.",
    "kernel: perf: interrupt took too long (2501 > 2500), lowering rate",
    "sshd[2214]: Accepted publickey for sre-oncall from 10.24.0.8",
    "kernel: EXT4-fs (sda1): re-mounted. Opts: errors=remount-ro",
    "chronyd[801]: Selected source 169.254.169.254 (metadata time)",
];

/// Fracture signature chatter: starved scheduler, blocked tasks.
const ZOMBIE_LINES: &[&str] = &[
    "kernel: BUG: soft lockup - CPU#0 stuck for 23s! [kworker/0:1:4712]",
    "kernel: INFO: task jbd2/sda1-8:312 blocked for more than 120 seconds.",
    "kernel: oom_reaper: reaped process 4821 (telemetry-agent)",
    "kernel: rcu_sched self-detected stall on CPU 0 (t=60002 jiffies)",
    "kernel: watchdog: BUG: scheduler watchdog timeout, no progress",
    "systemd[1]: telemetry-agent.service: Watchdog timeout (limit 30s)!",
];

/// Saturation strike chatter: hostile traffic, contention.
const STRIKE_LINES: &[&str] = &[
    "sshd[5512]: Failed password for root from 185.220.101.45 port 48122",
    "kernel: nf_conntrack: table full, dropping packet",
    "kernel: TCP: request_sock_TCP: Possible SYN flooding on port 443.",
    "sshd[5530]: error: maximum authentication attempts exceeded for root",
    "kernel: CPU3: Core temperature above threshold, cpu clock throttled",
];

/// Line pool for a regime. `RemotePulse` reuses the zombie pool; the
/// injected strike is indistinguishable from an organic fracture in the
/// log feed.
#[must_use]
pub fn line_pool(pattern: SignalPattern) -> &'static [&'static str] {
    match pattern {
        SignalPattern::Nominal => NOMINAL_LINES,
        SignalPattern::Zombie | SignalPattern::RemotePulse => ZOMBIE_LINES,
        SignalPattern::CpuStrike => STRIKE_LINES,
    }
}

/// Bounded window of recent log lines, oldest evicted first.
#[derive(Debug, Clone)]
pub struct LogWindow {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogWindow {
    /// Create a window retaining at most `capacity` lines.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line, evicting the oldest when full.
    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    /// The `n` most recent lines, oldest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).cloned().collect()
    }

    /// Number of retained lines.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when the window holds no lines.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for LogWindow {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_LINES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_evicts_oldest() {
        let mut w = LogWindow::new(2);
        w.push("a");
        w.push("b");
        w.push("c");
        assert_eq!(w.recent(10), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut w = LogWindow::default();
        for i in 0..5 {
            w.push(format!("line-{i}"));
        }
        assert_eq!(w.recent(2), vec!["line-3".to_string(), "line-4".to_string()]);
    }

    #[test]
    fn pulse_shares_zombie_pool() {
        assert_eq!(
            line_pool(SignalPattern::RemotePulse).as_ptr(),
            line_pool(SignalPattern::Zombie).as_ptr()
        );
    }
}
