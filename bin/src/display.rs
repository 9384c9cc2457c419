//! Argument parsing and output helpers for the chartfeed CLI.

use anyhow::{Context, Result, bail};
use chartfeed_lib::{day_end, day_start};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Which side of a range a date-only argument stands for.
#[derive(Clone, Copy)]
pub(crate) enum Bound {
    Start,
    End,
}

/// Parses an RFC 3339 instant or a `YYYY-MM-DD` date.
///
/// A bare date is the first second of that day for a start bound and the
/// last instant of that day for an end bound.
pub(crate) fn parse_instant(value: &str, bound: Bound) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date or timestamp: {value}"))?;
    Ok(match bound {
        Bound::Start => day_start(date),
        Bound::End => day_end(date),
    })
}

/// Parses a start/end argument pair.
pub(crate) fn parse_range(start: &str, end: &str) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = parse_instant(start, Bound::Start)?;
    let end = parse_instant(end, Bound::End)?;
    if start >= end {
        bail!("Start {start} must be before end {end}");
    }
    Ok((start, end))
}

/// Prints a value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_dates_and_instants() {
        let (start, end) = parse_range("2024-01-02", "2024-01-03").unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(end, day_end(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()));

        let instant = parse_instant("2024-01-02T10:00:00+02:00", Bound::Start).unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_instant("yesterday", Bound::Start).is_err());
        assert!(parse_range("2024-01-03", "2024-01-02").is_err());
    }
}
