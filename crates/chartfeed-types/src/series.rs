//! Series identity.

use serde::{Deserialize, Serialize};

use crate::Interval;

/// Identifies a logical time series: `(exchange, symbol, interval)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    /// Exchange name or code (e.g. "NASDAQ").
    pub exchange: String,
    /// Asset symbol (e.g. "AAPL").
    pub symbol: String,
    /// Bar interval.
    pub interval: Interval,
}

impl SeriesKey {
    /// Creates a new series key.
    #[must_use]
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            interval,
        }
    }

    /// Returns the key of the 1-second base series for the same instrument.
    #[must_use]
    pub fn base(&self) -> Self {
        self.with_interval(Interval::Second1)
    }

    /// Returns the key of the same instrument at a different interval.
    #[must_use]
    pub fn with_interval(&self, interval: Interval) -> Self {
        Self {
            exchange: self.exchange.clone(),
            symbol: self.symbol.clone(),
            interval,
        }
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.exchange, self.symbol, self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_key() {
        let key = SeriesKey::new("NASDAQ", "AAPL", Interval::Minute5);
        assert_eq!(key.to_string(), "NASDAQ:AAPL:5m");
        assert_eq!(key.base().interval, Interval::Second1);
        assert_eq!(key.base().symbol, "AAPL");
    }
}
