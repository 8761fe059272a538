//! Calendar windows and bounded-limit validation.
//!
//! Day and month windows start at UTC midnight and at the first of the
//! month respectively. Counters remember the start of the window they were
//! last written in and reset lazily when "now" falls in a later one.
//! Per-session state that has gone idle is dropped by a periodic [`Sweep`].

use chrono::{DateTime, Datelike, NaiveTime, TimeDelta, Utc};

use warden_contracts::error::{WardenError, WardenResult};

/// Slack used when comparing accumulated floating-point totals to limits.
pub const EPSILON: f64 = 1e-9;

/// Default idle time after which a session's state is forgotten.
pub const DEFAULT_SESSION_TTL_SECONDS: f64 = 86_400.0;
const MAX_SESSION_TTL_SECONDS: f64 = 30.0 * 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    Day,
    Month,
}

impl Calendar {
    pub fn start_of(self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let date = instant.date_naive();
        let date = match self {
            Self::Day => date,
            Self::Month => date.with_day(1).unwrap_or(date),
        };
        date.and_time(NaiveTime::MIN).and_utc()
    }
}

/// Amount and count accumulated within one calendar window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tally {
    pub window_start: Option<DateTime<Utc>>,
    pub amount: f64,
    pub count: u64,
}

impl Tally {
    /// Reset if `window_start` is a newer window than the one recorded.
    pub fn roll(&mut self, window_start: DateTime<Utc>) -> &mut Self {
        if self.window_start != Some(window_start) {
            *self = Self { window_start: Some(window_start), amount: 0.0, count: 0 };
        }
        self
    }

    pub fn add(&mut self, amount: f64) {
        self.amount += amount;
        self.count += 1;
    }

    /// Undo an `add` made in `window_start`. No-op once the window rolled.
    pub fn remove(&mut self, window_start: DateTime<Utc>, amount: f64) {
        if self.window_start == Some(window_start) {
            self.amount = (self.amount - amount).max(0.0);
            self.count = self.count.saturating_sub(1);
        }
    }
}

/// Gates sweeps of idle state to at most one per minute.
#[derive(Debug, Default)]
pub struct Sweep {
    last: Option<DateTime<Utc>>,
}

impl Sweep {
    /// True when a sweep is due at `now`, which is then recorded as the last.
    pub fn due(&mut self, now: DateTime<Utc>) -> bool {
        if self.last.is_some_and(|last| now - last < TimeDelta::minutes(1)) {
            return false;
        }
        self.last = Some(now);
        true
    }
}

/// Seconds as a `TimeDelta`. The value must already be range-checked.
pub fn seconds(value: f64) -> TimeDelta {
    TimeDelta::milliseconds((value * 1000.0).round() as i64)
}

/// Require an optional limit to be finite and non-negative.
pub fn check_limit(field: &str, value: Option<f64>) -> WardenResult<()> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(WardenError::config(format!(
            "{field} must be a non-negative number, got {v}"
        ))),
        _ => Ok(()),
    }
}

/// Require a ratio in `[0, 1]`.
pub fn check_fraction(field: &str, value: f64) -> WardenResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(WardenError::config(format!("{field} must be within [0, 1], got {value}")));
    }
    Ok(())
}

/// Require a duration in seconds to be finite and non-negative.
pub fn check_seconds(field: &str, value: f64) -> WardenResult<()> {
    check_limit(field, Some(value))
}

/// Require a session idle time between zero and thirty days.
pub fn check_session_ttl(value: f64) -> WardenResult<()> {
    check_seconds("session_ttl_seconds", value)?;
    if value > MAX_SESSION_TTL_SECONDS {
        return Err(WardenError::config(format!(
            "session_ttl_seconds must not exceed {MAX_SESSION_TTL_SECONDS}, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn windows_start_at_calendar_boundaries() {
        let t = Utc.with_ymd_and_hms(2026, 2, 17, 23, 59, 59).unwrap();
        assert_eq!(Calendar::Day.start_of(t), Utc.with_ymd_and_hms(2026, 2, 17, 0, 0, 0).unwrap());
        assert_eq!(Calendar::Month.start_of(t), Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn tally_resets_when_window_rolls() {
        let day1 = Utc.with_ymd_and_hms(2026, 2, 17, 0, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 2, 18, 0, 0, 0).unwrap();

        let mut tally = Tally::default();
        tally.roll(day1).add(4.0);
        tally.roll(day1).add(1.5);
        assert_eq!(tally.amount, 5.5);
        assert_eq!(tally.count, 2);

        tally.roll(day2);
        assert_eq!(tally.amount, 0.0);

        // Rolling back a day-1 charge must not touch day-2 totals.
        tally.add(2.0);
        tally.remove(day1, 4.0);
        assert_eq!(tally.amount, 2.0);
    }

    #[test]
    fn sweeps_run_at_most_once_a_minute() {
        let t = Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0).unwrap();
        let mut sweep = Sweep::default();
        assert!(sweep.due(t));
        assert!(!sweep.due(t + TimeDelta::seconds(59)));
        assert!(sweep.due(t + TimeDelta::seconds(60)));
        assert!(!sweep.due(t + TimeDelta::seconds(61)));
    }

    #[test]
    fn limit_validation() {
        assert!(check_limit("max_daily_spend", Some(10.0)).is_ok());
        assert!(check_limit("max_daily_spend", None).is_ok());
        assert!(check_limit("max_daily_spend", Some(-1.0)).is_err());
        assert!(check_limit("max_daily_spend", Some(f64::INFINITY)).is_err());
        assert!(check_fraction("warn_threshold", 0.8).is_ok());
        assert!(check_fraction("warn_threshold", 1.2).is_err());
        assert!(check_fraction("warn_threshold", f64::NAN).is_err());
        assert!(check_session_ttl(3_600.0).is_ok());
        assert!(check_session_ttl(-1.0).is_err());
        assert!(check_session_ttl(f64::INFINITY).is_err());
        assert!(check_session_ttl(365.0 * 86_400.0).is_err());
    }
}
