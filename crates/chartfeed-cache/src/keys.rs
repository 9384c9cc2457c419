//! Cache key namespace.
//!
//! Every key a session owns ends with (or, for results, starts with) its
//! token, so a session's footprint is exactly what [`session_data_patterns`]
//! matches.

use chartfeed_types::{Interval, SeriesKey};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Prefix of base-cache and aggregated-range keys.
pub const OHLC_PREFIX: &str = "ohlc";
/// Prefix of materialized-result handles.
pub const HANDLE_PREFIX: &str = "chart_data";
/// Prefix of session marker keys.
pub const SESSION_PREFIX: &str = "session";

/// Characters that would split a key or widen a `SCAN MATCH` pattern.
const RESERVED: &[char] = &[':', '*', '?', '[', ']', '\\'];

/// Returns true if `segment` can be embedded in a key as-is.
///
/// Exchanges, symbols and session tokens must pass this check before any key
/// is built from them.
#[must_use]
pub fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment
            .chars()
            .any(|c| c.is_whitespace() || RESERVED.contains(&c))
}

/// Key of one day of 1-second bars:
/// `ohlc:{exchange}:{symbol}:1s:{YYYY-MM-DD}:{session}`.
#[must_use]
pub fn base_day_key(series: &SeriesKey, day: NaiveDate, session: &str) -> String {
    format!(
        "{OHLC_PREFIX}:{}:{}:{}:{}:{session}",
        series.exchange,
        series.symbol,
        Interval::Second1,
        day.format("%Y-%m-%d"),
    )
}

/// Key of an aggregated series for an exact query range:
/// `ohlc:{exchange}:{symbol}:{interval}:{start}_{end}:{session}`.
#[must_use]
pub fn range_key(
    series: &SeriesKey,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    session: &str,
) -> String {
    format!(
        "{OHLC_PREFIX}:{}:{}:{}:{}_{}:{session}",
        series.exchange,
        series.symbol,
        series.interval,
        start.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        end.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    )
}

/// Key of a result handle: `chart_data:{session}:{id}`.
#[must_use]
pub fn handle_key(session: &str, id: &str) -> String {
    format!("{HANDLE_PREFIX}:{session}:{id}")
}

/// Key of a session marker: `session:{token}`.
#[must_use]
pub fn session_key(token: &str) -> String {
    format!("{SESSION_PREFIX}:{token}")
}

/// Extracts the token from a session marker key.
#[must_use]
pub fn session_token(marker_key: &str) -> Option<&str> {
    marker_key
        .strip_prefix(SESSION_PREFIX)?
        .strip_prefix(':')
        .filter(|t| !t.is_empty())
}

/// Pattern matching every session marker.
#[must_use]
pub fn session_marker_pattern() -> String {
    format!("{SESSION_PREFIX}:*")
}

/// Patterns matching every data key a session owns.
#[must_use]
pub fn session_data_patterns(token: &str) -> [String; 2] {
    [
        format!("{OHLC_PREFIX}:*:{token}"),
        format!("{HANDLE_PREFIX}:{token}:*"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::glob_match;
    use chrono::TimeZone;

    #[test]
    fn test_segment_validation() {
        assert!(is_valid_segment("NASDAQ"));
        assert!(is_valid_segment("BRK.B"));
        assert!(is_valid_segment("0b1c2d3e-aaaa-4bbb-8ccc-123456789abc"));
        for bad in ["", "a:b", "s*", "s?", "[s]", "a\\b", "two words"] {
            assert!(!is_valid_segment(bad), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_base_day_key_format() {
        let series = SeriesKey::new("NASDAQ", "AAPL", Interval::Minute5);
        let day = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(
            base_day_key(&series, day, "tok"),
            "ohlc:NASDAQ:AAPL:1s:2024-03-07:tok"
        );
    }

    #[test]
    fn test_range_key_format() {
        let series = SeriesKey::new("NYSE", "IBM", Interval::Minute15);
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 16, 0, 0).unwrap();
        assert_eq!(
            range_key(&series, start, end, "tok"),
            "ohlc:NYSE:IBM:15m:2024-01-02T09:30:00Z_2024-01-02T16:00:00Z:tok"
        );
    }

    #[test]
    fn test_session_token_roundtrip() {
        assert_eq!(session_token(&session_key("abc")), Some("abc"));
        assert_eq!(session_token("session:"), None);
        assert_eq!(session_token("sessionabc"), None);
    }

    #[test]
    fn test_patterns_cover_only_own_session() {
        let series = SeriesKey::new("NYSE", "IBM", Interval::Minute1);
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let [ohlc, results] = session_data_patterns("s1");

        assert!(glob_match(&ohlc, &base_day_key(&series, day, "s1")));
        assert!(!glob_match(&ohlc, &base_day_key(&series, day, "s2")));
        assert!(glob_match(&results, &handle_key("s1", "u")));
        assert!(glob_match(&results, &format!("{}:5m", handle_key("s1", "u"))));
        assert!(!glob_match(&results, &handle_key("s2", "u")));
    }
}
