// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Geofence validity schedules.
//!
//! A [`Schedule`] describes an absolute validity window plus a repeating
//! active sub-window. Occurrence `n` (1-based) starts at
//! `valid_from + daily_begin + (n-1) * repeat_period`, lasts
//! `daily_duration`, and is clipped to `[valid_from, valid_to]`. The repeat
//! offset/span pair restricts which occurrences are eligible:
//! `repeat_offset <= n` (when the offset is set) and
//! `n < repeat_offset + repeat_span` (when the span is set; 0 means
//! unbounded). A zero `repeat_period` degenerates to the single window
//! `[valid_from + daily_begin, + daily_duration)`.
//!
//! The type is pure: it answers "is the schedule active at time T" and
//! "when is the next transition" without touching any clock.

use crate::{Error, Result};
use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// Absolute point in time, as duration since the time source's epoch.
///
/// The broadcaster never interprets the epoch; the injected clock defines
/// it (wall clock: the UNIX epoch; manual clock: whatever the test picks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(Duration::ZERO);

    /// Seconds since epoch; negative input clamps to the epoch.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs <= 0.0 || !secs.is_finite() {
            return Timestamp::ZERO;
        }
        Timestamp(Duration::from_secs_f64(secs))
    }

    pub fn from_duration(d: Duration) -> Self {
        Timestamp(d)
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0.as_secs_f64()
    }

    pub fn as_duration(self) -> Duration {
        self.0
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(rhs))
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Timestamp) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0.as_secs_f64())
    }
}

/// Validity window plus repeating active sub-window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    valid_from: Timestamp,
    valid_to: Timestamp,
    daily_begin: Duration,
    daily_duration: Duration,
    repeat_offset: u32,
    repeat_span: u32,
    repeat_period: Duration,
}

impl Schedule {
    /// Build a schedule, validating its invariants:
    /// `valid_from <= valid_to`, and `daily_duration <= repeat_period` when
    /// the schedule repeats.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        valid_from: Timestamp,
        valid_to: Timestamp,
        daily_begin: Duration,
        daily_duration: Duration,
        repeat_offset: u32,
        repeat_span: u32,
        repeat_period: Duration,
    ) -> Result<Self> {
        if valid_from > valid_to {
            return Err(Error::InvalidArgument(format!(
                "schedule validity window is inverted ({} > {})",
                valid_from, valid_to
            )));
        }
        if !repeat_period.is_zero() && daily_duration > repeat_period {
            return Err(Error::InvalidArgument(format!(
                "daily duration {:?} exceeds repeat period {:?}",
                daily_duration, repeat_period
            )));
        }
        Ok(Schedule {
            valid_from,
            valid_to,
            daily_begin,
            daily_duration,
            repeat_offset,
            repeat_span,
            repeat_period,
        })
    }

    /// Non-repeating schedule: one window at `daily_begin` past `valid_from`.
    pub fn single_window(
        valid_from: Timestamp,
        valid_to: Timestamp,
        begin: Duration,
        duration: Duration,
    ) -> Result<Self> {
        Schedule::new(valid_from, valid_to, begin, duration, 0, 0, Duration::ZERO)
    }

    pub fn valid_from(&self) -> Timestamp {
        self.valid_from
    }

    pub fn valid_to(&self) -> Timestamp {
        self.valid_to
    }

    /// Clipped window of 1-based occurrence `n`; `None` once windows fall
    /// outside the validity range (or can never be non-empty).
    fn occurrence_window(&self, n: u64) -> Option<(Timestamp, Timestamp)> {
        if n == 0 || (self.repeat_period.is_zero() && n > 1) {
            return None;
        }
        let shift = u32::try_from(n - 1)
            .ok()
            .and_then(|steps| self.repeat_period.checked_mul(steps))?;
        let start = self.valid_from + self.daily_begin + shift;
        if start >= self.valid_to {
            return None;
        }
        let end = (start + self.daily_duration).min(self.valid_to);
        if end <= start {
            return None;
        }
        Some((start, end))
    }

    /// Offset/span eligibility of 1-based occurrence `n`.
    fn eligible(&self, n: u64) -> bool {
        let first = if self.repeat_offset > 0 { u64::from(self.repeat_offset) } else { 1 };
        if n < first {
            return false;
        }
        if self.repeat_span > 0 && n >= first + u64::from(self.repeat_span) {
            return false;
        }
        true
    }

    /// Index of the first occurrence whose window has not ended by `t`.
    fn occurrence_at_or_after(&self, t: Timestamp) -> u64 {
        let base = self.valid_from + self.daily_begin;
        let n = if t < base || self.repeat_period.is_zero() {
            1
        } else {
            let idx = (t - base).as_nanos() / self.repeat_period.as_nanos();
            u64::try_from(idx).unwrap_or(u64::MAX - 1) + 1
        };
        match self.occurrence_window(n) {
            Some((_, end)) if end > t => n,
            _ => n + 1,
        }
    }

    /// Whether the schedule is active at `t`.
    pub fn is_active_at(&self, t: Timestamp) -> bool {
        if t < self.valid_from || t >= self.valid_to {
            return false;
        }
        let n = self.occurrence_at_or_after(t);
        if !self.eligible(n) {
            return false;
        }
        matches!(self.occurrence_window(n), Some((start, end)) if start <= t && t < end)
    }

    /// The next state change at or after `t`: `Some((when, becoming_active))`,
    /// or `None` once the schedule is exhausted.
    pub fn next_transition(&self, t: Timestamp) -> Option<(Timestamp, bool)> {
        if t >= self.valid_to {
            return None;
        }
        let t = t.max(self.valid_from);
        let mut n = self.occurrence_at_or_after(t);
        loop {
            if !self.eligible(n) {
                let first = if self.repeat_offset > 0 { u64::from(self.repeat_offset) } else { 1 };
                if self.repeat_span > 0 && n >= first + u64::from(self.repeat_span) {
                    return None; // past the last eligible occurrence
                }
                n += 1; // still before the first eligible occurrence
                continue;
            }
            let (start, end) = self.occurrence_window(n)?;
            if t < start {
                return Some((start, true));
            }
            return Some((end, false));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Timestamp {
        Timestamp::from_secs_f64(s)
    }

    fn dur(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    /// The canonical repeating schedule: windows [2,3.1), [4,5.1), [6,7.1)
    /// clipped at valid_to = 8.
    fn repeating() -> Schedule {
        Schedule::new(secs(0.0), secs(8.0), dur(2.0), dur(1.1), 1, 0, dur(2.0))
            .expect("valid schedule")
    }

    #[test]
    fn test_rejects_inverted_validity() {
        assert!(Schedule::new(secs(5.0), secs(1.0), dur(0.0), dur(1.0), 0, 0, dur(0.0)).is_err());
    }

    #[test]
    fn test_rejects_duration_longer_than_period() {
        assert!(Schedule::new(secs(0.0), secs(10.0), dur(0.0), dur(3.0), 0, 0, dur(2.0)).is_err());
    }

    #[test]
    fn test_active_windows() {
        let s = repeating();
        assert!(!s.is_active_at(secs(1.9)));
        assert!(s.is_active_at(secs(2.0)));
        assert!(s.is_active_at(secs(3.0)));
        assert!(!s.is_active_at(secs(3.1)));
        assert!(s.is_active_at(secs(4.5)));
        assert!(!s.is_active_at(secs(5.5)));
        assert!(s.is_active_at(secs(7.0)));
        assert!(!s.is_active_at(secs(7.5)));
        assert!(!s.is_active_at(secs(8.0)));
        assert!(!s.is_active_at(secs(20.0)));
    }

    #[test]
    fn test_transition_sequence_until_expiry() {
        let s = repeating();
        // walk the full activation/deactivation sequence from t = 0
        let mut t = secs(0.0);
        let mut seq = Vec::new();
        while let Some((when, becoming_active)) = s.next_transition(t) {
            seq.push((when.as_secs_f64(), becoming_active));
            t = when;
        }
        let expected = [
            (2.0, true),
            (3.1, false),
            (4.0, true),
            (5.1, false),
            (6.0, true),
            (7.1, false),
        ];
        assert_eq!(seq.len(), expected.len());
        for ((got_t, got_active), (want_t, want_active)) in seq.iter().zip(expected.iter()) {
            assert!((got_t - want_t).abs() < 1e-9, "got {} want {}", got_t, want_t);
            assert_eq!(got_active, want_active);
        }
        // and nothing fires past valid_to
        assert!(s.next_transition(secs(8.0)).is_none());
        assert!(s.next_transition(secs(100.0)).is_none());
    }

    #[test]
    fn test_single_window_period_zero() {
        let s = Schedule::single_window(secs(10.0), secs(100.0), dur(5.0), dur(2.0))
            .expect("valid schedule");
        assert!(!s.is_active_at(secs(14.9)));
        assert!(s.is_active_at(secs(15.0)));
        assert!(s.is_active_at(secs(16.9)));
        assert!(!s.is_active_at(secs(17.0)));
        assert_eq!(s.next_transition(secs(0.0)), Some((secs(15.0), true)));
        assert_eq!(s.next_transition(secs(15.5)), Some((secs(17.0), false)));
        assert!(s.next_transition(secs(17.0)).is_none());
    }

    #[test]
    fn test_before_valid_from_is_inactive() {
        let s = Schedule::new(secs(100.0), secs(200.0), dur(0.0), dur(10.0), 0, 0, dur(50.0))
            .expect("valid schedule");
        assert!(!s.is_active_at(secs(99.9)));
        assert_eq!(s.next_transition(secs(0.0)), Some((secs(100.0), true)));
    }

    #[test]
    fn test_offset_skips_early_occurrences() {
        // windows at 0, 10, 20, ... but only occurrences 2..4 are eligible
        let s = Schedule::new(secs(0.0), secs(100.0), dur(0.0), dur(1.0), 2, 2, dur(10.0))
            .expect("valid schedule");
        assert!(!s.is_active_at(secs(0.5)));
        assert!(s.is_active_at(secs(10.5)));
        assert!(s.is_active_at(secs(20.5)));
        assert!(!s.is_active_at(secs(30.5)));
        assert_eq!(s.next_transition(secs(0.0)), Some((secs(10.0), true)));
        assert_eq!(s.next_transition(secs(10.5)), Some((secs(11.0), false)));
        // past the eligible span there is nothing left
        assert!(s.next_transition(secs(21.0)).is_none());
    }

    #[test]
    fn test_window_clipped_at_valid_to() {
        let s = Schedule::new(secs(0.0), secs(4.5), dur(2.0), dur(1.0), 0, 0, dur(2.0))
            .expect("valid schedule");
        // second window [4, 5) is clipped to [4, 4.5)
        assert_eq!(s.next_transition(secs(4.1)), Some((secs(4.5), false)));
        assert!(s.next_transition(secs(4.5)).is_none());
    }

    #[test]
    fn test_zero_duration_never_active() {
        let s = Schedule::new(secs(0.0), secs(10.0), dur(1.0), dur(0.0), 0, 0, dur(2.0))
            .expect("valid schedule");
        assert!(!s.is_active_at(secs(1.0)));
        assert!(s.next_transition(secs(0.0)).is_none());
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let t = secs(5.0) + dur(2.5);
        assert!((t.as_secs_f64() - 7.5).abs() < 1e-12);
        assert_eq!(secs(3.0) - secs(5.0), Duration::ZERO);
        assert_eq!(secs(5.0).saturating_since(secs(3.0)), dur(2.0));
        assert_eq!(Timestamp::from_secs_f64(-4.0), Timestamp::ZERO);
    }
}
