//! Calendar periods and granted time windows.
//!
//! `YearMonthDay` is a calendar delta, not a day count. Adding it to a
//! timestamp walks the real calendar (months first, then days), so a
//! one-year purchase always ends on the same calendar day next year.
//!
//! `to_days` is the fixed approximation used only for proration and
//! reserved-day balances: 366 days per year, 31 days per month. Both
//! constants round in the buyer's favor and existing balances depend on
//! them, so they must not be replaced by precise calendar math.

use chrono::{Duration, Months};
use serde::{Deserialize, Serialize};

use super::Timestamp;

/// Days credited per year in the fixed approximation.
pub const DAYS_PER_YEAR: i64 = 366;

/// Days credited per month in the fixed approximation.
pub const DAYS_PER_MONTH: i64 = 31;

/// A `{years, months, days}` calendar delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct YearMonthDay {
    pub years: u32,
    pub months: u32,
    pub days: u32,
}

impl YearMonthDay {
    pub fn new(years: u32, months: u32, days: u32) -> Self {
        Self {
            years,
            months,
            days,
        }
    }

    pub fn years(years: u32) -> Self {
        Self::new(years, 0, 0)
    }

    pub fn months(months: u32) -> Self {
        Self::new(0, months, 0)
    }

    pub fn days(days: u32) -> Self {
        Self::new(0, 0, days)
    }

    /// Day count under the fixed 366/31 approximation.
    pub fn to_days(&self) -> i64 {
        i64::from(self.years) * DAYS_PER_YEAR
            + i64::from(self.months) * DAYS_PER_MONTH
            + i64::from(self.days)
    }

    /// Adds this delta to `ts` using calendar arithmetic.
    ///
    /// Months are added before days; a month addition landing past the end
    /// of a shorter month clamps to its last day. Returns `None` on overflow.
    pub fn add_to(&self, ts: Timestamp) -> Option<Timestamp> {
        let total_months = self.years.checked_mul(12)?.checked_add(self.months)?;
        ts.as_datetime()
            .checked_add_months(Months::new(total_months))?
            .checked_add_signed(Duration::days(i64::from(self.days)))
            .map(Timestamp::from_datetime)
    }
}

impl std::fmt::Display for YearMonthDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}y{}m{}d", self.years, self.months, self.days)
    }
}

/// A half-open `[start, end)` span of granted access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl DateWindow {
    /// Builds the window `[start, start + period)`.
    pub fn starting_at(start: Timestamp, period: &YearMonthDay) -> Option<Self> {
        let end = period.add_to(start)?;
        Some(Self { start, end })
    }

    /// True if access granted by this window extends beyond `at`.
    pub fn ends_after(&self, at: Timestamp) -> bool {
        self.end > at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    #[test]
    fn one_year_one_day_spans_calendar_year_plus_day() {
        let start = ts("2024-01-10T00:00:00Z");
        let end = YearMonthDay::new(1, 0, 1).add_to(start).unwrap();
        assert_eq!(end, ts("2025-01-11T00:00:00Z"));
    }

    #[test]
    fn month_addition_clamps_to_end_of_short_month() {
        let start = ts("2024-01-31T08:00:00Z");
        let end = YearMonthDay::months(1).add_to(start).unwrap();
        assert_eq!(end, ts("2024-02-29T08:00:00Z"));
    }

    #[test]
    fn leap_day_plus_one_year_lands_on_last_day_of_february() {
        let start = ts("2024-02-29T00:00:00Z");
        let end = YearMonthDay::years(1).add_to(start).unwrap();
        assert_eq!(end, ts("2025-02-28T00:00:00Z"));
    }

    #[test]
    fn to_days_uses_buyer_favoring_constants() {
        assert_eq!(YearMonthDay::new(1, 0, 1).to_days(), 367);
        assert_eq!(YearMonthDay::new(0, 1, 1).to_days(), 32);
        assert_eq!(YearMonthDay::days(5).to_days(), 5);
        assert_eq!(YearMonthDay::new(2, 3, 4).to_days(), 2 * 366 + 3 * 31 + 4);
    }

    #[test]
    fn zero_period_is_identity() {
        let start = ts("2024-05-05T05:05:05Z");
        assert_eq!(YearMonthDay::default().add_to(start), Some(start));
    }

    #[test]
    fn overflowing_period_returns_none() {
        let start = ts("2024-01-01T00:00:00Z");
        assert!(YearMonthDay::years(u32::MAX).add_to(start).is_none());
    }

    #[test]
    fn window_ends_after_is_exclusive_of_end() {
        let window =
            DateWindow::starting_at(ts("2024-01-01T00:00:00Z"), &YearMonthDay::days(10)).unwrap();

        assert_eq!(window.end, ts("2024-01-11T00:00:00Z"));
        assert!(window.ends_after(ts("2024-01-05T00:00:00Z")));
        assert!(!window.ends_after(ts("2024-01-11T00:00:00Z")));
    }

    #[test]
    fn period_displays_compactly() {
        assert_eq!(YearMonthDay::new(1, 2, 3).to_string(), "1y2m3d");
    }
}
