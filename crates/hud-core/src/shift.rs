//! Watch shifts and the drill scheduler
//!
//! The ops calendar runs three fixed shifts on the site-local clock
//! (configured as a UTC offset, default central standard time):
//!
//! - 1ST_SHIFT 09:00-16:59 - fully staffed
//! - 2ND_SHIFT 17:00-00:59 - reduced staff
//! - 3RD_SHIFT 01:00-08:59 - unstaffed; the sentinel remediates
//!   autonomously without waiting on the forensic hold
//!
//! The drill scheduler fires readiness drills at both shift handovers
//! (09:00, 17:00) and hourly through the unstaffed window, deduplicated
//! per local hour.

use crate::config::SentinelConfig;
use crate::types::SourceTag;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// One of the three watch shifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchShift {
    /// 09:00-16:59 local
    First,
    /// 17:00-00:59 local
    Second,
    /// 01:00-08:59 local, autonomous
    Third,
}

impl WatchShift {
    /// Shift covering a local hour (0-23).
    #[must_use]
    pub fn for_hour(hour: u32) -> Self {
        match hour {
            9..=16 => Self::First,
            17..=23 | 0 => Self::Second,
            _ => Self::Third,
        }
    }

    /// Shift covering `when`, evaluated on the site-local clock.
    #[must_use]
    pub fn at(when: DateTime<Utc>, utc_offset_hours: i8) -> Self {
        Self::for_hour(local_hour(when, utc_offset_hours))
    }

    /// Numeric shift id used in audit rows.
    #[must_use]
    pub fn id(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
            Self::Third => 3,
        }
    }

    /// Wire name used in audit rows.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::First => "1ST_SHIFT",
            Self::Second => "2ND_SHIFT",
            Self::Third => "3RD_SHIFT",
        }
    }

    /// Unstaffed shifts skip the human gate entirely.
    #[must_use]
    pub fn is_autonomous(self) -> bool {
        self == Self::Third
    }
}

impl std::fmt::Display for WatchShift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn local_hour(when: DateTime<Utc>, utc_offset_hours: i8) -> u32 {
    match FixedOffset::east_opt(i32::from(utc_offset_hours) * 3600) {
        Some(offset) => when.with_timezone(&offset).hour(),
        None => when.hour(),
    }
}

fn local_date_hour(when: DateTime<Utc>, utc_offset_hours: i8) -> (NaiveDate, u32) {
    match FixedOffset::east_opt(i32::from(utc_offset_hours) * 3600) {
        Some(offset) => {
            let local = when.with_timezone(&offset);
            (local.date_naive(), local.hour())
        }
        None => (when.date_naive(), when.hour()),
    }
}

/// Fires scheduled readiness drills, at most one per eligible local hour.
#[derive(Debug, Clone)]
pub struct DrillScheduler {
    utc_offset_hours: i8,
    last_fired: Option<(NaiveDate, u32)>,
}

impl DrillScheduler {
    /// Build a scheduler on the given site-local offset.
    #[must_use]
    pub fn new(utc_offset_hours: i8) -> Self {
        Self {
            utc_offset_hours,
            last_fired: None,
        }
    }

    /// Build a scheduler from the sentinel config.
    #[must_use]
    pub fn from_config(config: &SentinelConfig) -> Self {
        Self::new(config.shift_utc_offset_hours)
    }

    /// Drill-eligible local hours: shift handovers plus the unstaffed
    /// overnight window.
    #[must_use]
    pub fn is_drill_hour(hour: u32) -> bool {
        hour == 9 || hour == 17 || (1..=8).contains(&hour)
    }

    /// Check the calendar. Returns the drill source exactly once per
    /// eligible hour; the caller routes it through the traffic controller
    /// like any other automated strike.
    pub fn due(&mut self, now: DateTime<Utc>) -> Option<SourceTag> {
        let (date, hour) = local_date_hour(now, self.utc_offset_hours);
        if !Self::is_drill_hour(hour) {
            return None;
        }
        if self.last_fired == Some((date, hour)) {
            return None;
        }
        self.last_fired = Some((date, hour));
        tracing::info!(hour, day = %date.day(), "scheduled drill due");
        Some(SourceTag::AutoSentinelScheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn shift_table_covers_the_clock() {
        assert_eq!(WatchShift::for_hour(9), WatchShift::First);
        assert_eq!(WatchShift::for_hour(16), WatchShift::First);
        assert_eq!(WatchShift::for_hour(17), WatchShift::Second);
        assert_eq!(WatchShift::for_hour(23), WatchShift::Second);
        assert_eq!(WatchShift::for_hour(0), WatchShift::Second);
        assert_eq!(WatchShift::for_hour(1), WatchShift::Third);
        assert_eq!(WatchShift::for_hour(8), WatchShift::Third);
    }

    #[test]
    fn only_third_shift_is_autonomous() {
        assert!(!WatchShift::First.is_autonomous());
        assert!(!WatchShift::Second.is_autonomous());
        assert!(WatchShift::Third.is_autonomous());
        assert_eq!(WatchShift::Third.as_str(), "3RD_SHIFT");
        assert_eq!(WatchShift::Third.id(), 3);
    }

    #[test]
    fn shift_is_evaluated_on_the_site_local_clock() {
        // 15:00 UTC at offset -6 is 09:00 local: first shift, not third.
        let when = utc(2025, 6, 10, 15, 0);
        assert_eq!(WatchShift::at(when, -6), WatchShift::First);
        assert_eq!(WatchShift::at(when, 0), WatchShift::First);
        // 07:00 UTC at offset -6 is 01:00 local: unstaffed.
        assert_eq!(WatchShift::at(utc(2025, 6, 10, 7, 0), -6), WatchShift::Third);
    }

    #[test]
    fn drills_fire_once_per_eligible_hour() {
        let mut s = DrillScheduler::new(0);
        let first = utc(2025, 6, 10, 9, 0);
        assert_eq!(s.due(first), Some(SourceTag::AutoSentinelScheduled));
        // Repeated checks inside the same hour stay quiet.
        assert_eq!(s.due(utc(2025, 6, 10, 9, 30)), None);
        assert_eq!(s.due(utc(2025, 6, 10, 9, 59)), None);
        // Next handover fires again.
        assert_eq!(s.due(utc(2025, 6, 10, 17, 5)), Some(SourceTag::AutoSentinelScheduled));
    }

    #[test]
    fn overnight_window_fires_hourly() {
        let mut s = DrillScheduler::new(0);
        for hour in 1..=8 {
            assert_eq!(
                s.due(utc(2025, 6, 10, hour, 10)),
                Some(SourceTag::AutoSentinelScheduled),
                "hour {hour}"
            );
        }
        // Staffed mid-morning hour is not a drill hour.
        assert_eq!(s.due(utc(2025, 6, 10, 10, 0)), None);
    }

    #[test]
    fn dedup_resets_across_days() {
        let mut s = DrillScheduler::new(0);
        assert!(s.due(utc(2025, 6, 10, 9, 0)).is_some());
        assert!(s.due(utc(2025, 6, 11, 9, 0)).is_some());
    }

    #[test]
    fn drill_hours_follow_the_local_offset() {
        let mut s = DrillScheduler::new(-6);
        // 15:00 UTC is 09:00 local at -6: drill due.
        assert!(s.due(utc(2025, 6, 10, 15, 0)).is_some());
        // 09:00 UTC is 03:00 local: overnight drill hour.
        assert!(s.due(utc(2025, 6, 10, 9, 0)).is_some());
    }
}
