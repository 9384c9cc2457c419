//! JSON encoding of stored bar series.

use chartfeed_types::{Bar, ChartfeedError};

use crate::CacheError;

/// Encodes a series as a JSON array.
///
/// # Errors
///
/// Returns an error if a bar cannot be serialized.
pub fn encode_bars(bars: &[Bar]) -> Result<String, CacheError> {
    Ok(serde_json::to_string(bars)?)
}

/// Decodes a stored JSON array of bars.
///
/// A blank value is malformed; `[]` is a valid empty series.
///
/// # Errors
///
/// Returns [`ChartfeedError::Malformed`] if the value is not a bar array.
pub fn decode_bars(raw: &str) -> chartfeed_types::Result<Vec<Bar>> {
    if raw.trim().is_empty() {
        return Err(ChartfeedError::Malformed("empty value".to_string()));
    }
    serde_json::from_str(raw).map_err(|e| ChartfeedError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_empty_array_is_valid() {
        assert!(decode_bars("[]").unwrap().is_empty());
        assert!(decode_bars("").is_err());
        assert!(decode_bars("{not json").is_err());
    }

    #[test]
    fn test_null_volume_decodes_as_zero() {
        let raw = r#"[{"timestamp":"2024-01-02T00:00:01Z","open":1,"high":2,"low":0.5,"close":1.5,"volume":null}]"#;
        let bars = decode_bars(raw).unwrap();
        assert_eq!(bars[0].volume, 0.0);
        assert_eq!(bars[0].timestamp, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 1).unwrap());
    }
}
