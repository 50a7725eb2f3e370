//! Wall-clock capability used to stamp readings.
//!
//! The core only asks "what time is it"; it never blocks on the answer.
//! `None` means the wall clock is not known yet and the reading is
//! reported without a timestamp.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};
use embassy_time::Instant;

pub trait Clock {
    /// Current local wall-clock time, if known.
    fn now(&self) -> Option<NaiveDateTime>;
}

/// Wall clock anchored on the monotonic timer.
///
/// Unsynced until [`SyncedClock::sync`] is given a Unix time from some
/// outside source; afterwards it extrapolates from the uptime counter.
pub struct SyncedClock {
    offset: FixedOffset,
    anchor: Option<(i64, Instant)>,
}

impl SyncedClock {
    /// `utc_offset_secs` is applied to every reading (timezone plus DST).
    /// An offset outside +/-24h falls back to UTC.
    pub fn new(utc_offset_secs: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_secs).unwrap_or_else(|| Utc.fix());
        Self {
            offset,
            anchor: None,
        }
    }

    /// Record that the Unix time is `unix_secs` at monotonic instant `at`.
    pub fn sync_at(&mut self, unix_secs: i64, at: Instant) {
        self.anchor = Some((unix_secs, at));
    }

    /// Record that the Unix time is `unix_secs` right now.
    pub fn sync(&mut self, unix_secs: i64) {
        self.sync_at(unix_secs, Instant::now());
    }

    /// Sync from a decimal Unix time such as `"1717243200"`. Returns
    /// whether the text was usable; the clock is untouched otherwise.
    pub fn sync_from_str(&mut self, text: &str) -> bool {
        match text.trim().parse::<i64>() {
            Ok(unix_secs) if DateTime::from_timestamp(unix_secs, 0).is_some() => {
                self.sync(unix_secs);
                true
            }
            _ => false,
        }
    }

    /// Local time at monotonic instant `at`, if synced.
    pub fn at(&self, at: Instant) -> Option<NaiveDateTime> {
        let (unix_secs, anchor) = self.anchor?;
        let elapsed = at.checked_duration_since(anchor)?.as_secs() as i64;
        let utc = DateTime::from_timestamp(unix_secs.checked_add(elapsed)?, 0)?;
        Some(utc.with_timezone(&self.offset).naive_local())
    }
}

impl Clock for SyncedClock {
    fn now(&self) -> Option<NaiveDateTime> {
        self.at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn sync_from_text_accepts_unix_seconds_only() {
        let mut clock = SyncedClock::new(0);
        assert!(!clock.sync_from_str("yesterday"));
        assert!(!clock.sync_from_str(""));
        assert!(clock.now().is_none());

        assert!(clock.sync_from_str(" 1717243200\n"));
        let now = clock.now().unwrap();
        assert!(now >= DateTime::from_timestamp(1_717_243_200, 0).unwrap().naive_utc());
    }

    #[test]
    fn unsynced_clock_has_no_time() {
        let clock = SyncedClock::new(0);
        assert!(clock.now().is_none());
    }

    #[test]
    fn synced_clock_extrapolates_from_anchor() {
        let mut clock = SyncedClock::new(0);
        let t0 = Instant::from_secs(100);
        clock.sync_at(1_700_000_000, t0);

        let later = clock.at(Instant::from_secs(165)).unwrap();
        assert_eq!(later.to_string(), "2023-11-14 22:14:25");
    }

    #[test]
    fn offset_shifts_to_local_time() {
        let mut clock = SyncedClock::new(7200);
        clock.sync_at(0, Instant::from_secs(0));
        assert_eq!(
            clock.at(Instant::from_secs(0)).unwrap().to_string(),
            "1970-01-01 02:00:00"
        );
    }

    #[test]
    fn instant_before_anchor_is_unknown() {
        let mut clock = SyncedClock::new(0);
        clock.sync_at(1_700_000_000, Instant::from_secs(10));
        assert!(clock.at(Instant::from_secs(5)).is_none());
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        let mut clock = SyncedClock::new(90_000);
        clock.sync_at(0, Instant::from_secs(0));
        assert_eq!(
            clock.at(Instant::from_secs(0)).unwrap().to_string(),
            "1970-01-01 00:00:00"
        );
    }
}
