//! OHLCV bar representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// OHLCV bar (candlestick) data.
///
/// A missing or `null` volume deserializes as `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bucket start time (UTC).
    pub timestamp: DateTime<Utc>,
    /// Opening price.
    pub open: f64,
    /// Highest price during the bucket.
    pub high: f64,
    /// Lowest price during the bucket.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Traded volume.
    #[serde(default, deserialize_with = "nullable_volume")]
    pub volume: f64,
}

impl Bar {
    /// Creates a new bar.
    #[must_use]
    pub const fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns the bar timestamp as whole Unix seconds.
    #[must_use]
    pub fn unix_seconds(&self) -> i64 {
        self.timestamp.timestamp()
    }
}

fn nullable_volume<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_missing_volume_is_zero() {
        let json = r#"{"timestamp":"2024-01-02T09:30:00Z","open":1.0,"high":2.0,"low":0.5,"close":1.5}"#;
        let bar: Bar = serde_json::from_str(json).unwrap();
        assert_eq!(bar.volume, 0.0);

        let json = r#"{"timestamp":"2024-01-02T09:30:00Z","open":1.0,"high":2.0,"low":0.5,"close":1.5,"volume":null}"#;
        let bar: Bar = serde_json::from_str(json).unwrap();
        assert_eq!(bar.volume, 0.0);
    }

    #[test]
    fn test_timestamp_round_trips_as_utc() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap();
        let bar = Bar::new(ts, 1.0, 2.0, 0.5, 1.5, 10.0);
        let json = serde_json::to_string(&bar).unwrap();
        let back: Bar = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bar);
        assert_eq!(back.unix_seconds(), ts.timestamp());
    }
}
