//! Date range and calendar-day iteration.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::DateRangeError;

/// An inclusive range of UTC calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// Start date (inclusive).
    pub start: NaiveDate,
    /// End date (inclusive).
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a new date range, validating that start <= end.
    ///
    /// # Errors
    ///
    /// Returns an error if start > end.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if start > end {
            return Err(DateRangeError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Creates the range of every UTC day intersecting `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns an error if start > end.
    pub fn covering(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DateRangeError> {
        Self::new(start.date_naive(), end.date_naive())
    }

    /// Returns an iterator over all days in the range.
    #[must_use]
    pub const fn days(&self) -> DayIterator {
        DayIterator {
            current: Some(self.start),
            end: self.end,
        }
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Iterator over all days in a date range.
#[derive(Debug, Clone)]
pub struct DayIterator {
    current: Option<NaiveDate>,
    end: NaiveDate,
}

impl Iterator for DayIterator {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<Self::Item> {
        let day = self.current.filter(|d| *d <= self.end)?;
        self.current = day.succ_opt();
        Some(day)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .current
            .filter(|d| *d <= self.end)
            .map_or(0, |d| (self.end - d).num_days() as usize + 1);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for DayIterator {}

/// Returns midnight (UTC) at the start of `date`.
#[must_use]
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Returns the last microsecond (UTC) of `date`.
#[must_use]
pub fn day_end(date: NaiveDate) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_date_range_invalid() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(DateRange::new(start, end).is_err());
    }

    #[test]
    fn test_day_iterator_crosses_month() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 30).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 2).unwrap();
        let range = DateRange::new(start, end).unwrap();
        let days: Vec<_> = range.days().collect();

        assert_eq!(days.len(), 4);
        assert_eq!(range.days().len(), 4);
        assert_eq!(days[0], start);
        assert_eq!(days[3], end);
    }

    #[test]
    fn test_covering_uses_utc_dates() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 2, 0, 1, 0).unwrap();
        let range = DateRange::covering(start, end).unwrap();
        assert_eq!(range.days().len(), 2);
    }

    #[test]
    fn test_day_bounds() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let start = day_start(date);
        let end = day_end(date);
        assert_eq!(start.hour(), 0);
        assert_eq!(end.hour(), 23);
        assert_eq!(end.nanosecond(), 999_999_000);
        assert_eq!(end.date_naive(), date);
    }
}
