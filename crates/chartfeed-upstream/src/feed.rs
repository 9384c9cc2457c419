//! The upstream fetch contract.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chartfeed_types::Bar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Granularity family requested from upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalKind {
    /// Intraday bars measured in seconds.
    Seconds,
    /// Daily bars.
    Daily,
}

impl IntervalKind {
    /// Returns the wire label for this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Seconds => "s",
            Self::Daily => "d",
        }
    }
}

/// One upstream request: bars for `symbol` in `[start, end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Asset symbol.
    pub symbol: String,
    /// Interval family.
    pub kind: IntervalKind,
    /// Interval length in units of `kind`.
    pub len: u32,
    /// First instant requested (inclusive).
    pub start: DateTime<Utc>,
    /// Last instant requested (inclusive).
    pub end: DateTime<Utc>,
}

impl FetchRequest {
    /// Creates a request for `len`-second bars.
    #[must_use]
    pub fn seconds(
        symbol: impl Into<String>,
        len: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            kind: IntervalKind::Seconds,
            len,
            start,
            end,
        }
    }

    /// Creates a request for daily bars.
    #[must_use]
    pub fn daily(symbol: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            kind: IntervalKind::Daily,
            len: 1,
            start,
            end,
        }
    }
}

/// Errors raised by an upstream feed.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// Upstream has no bars for the requested range.
    #[error("No data available for {symbol} in requested range")]
    NoData {
        /// The symbol that had no data.
        symbol: String,
    },

    /// Upstream rejected the credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// No connection to upstream could be established.
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error status after all retries.
    #[error("Server error: {status}")]
    Server {
        /// HTTP status code.
        status: u16,
    },
}

impl UpstreamError {
    /// Returns true if this is the legitimate "nothing there" condition.
    #[must_use]
    pub const fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData { .. })
    }

    /// Returns true if upstream rejected the credentials.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Returns true if the connection that produced this error should be dropped.
    #[must_use]
    pub fn is_connection_failure(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// A source of historical bars.
#[async_trait]
pub trait BarFeed: Send + Sync + std::fmt::Debug {
    /// Fetches bars in `[request.start, request.end]`, sorted ascending.
    ///
    /// May return [`UpstreamError::NoData`] instead of an empty vector.
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Bar>, UpstreamError>;
}

/// Simulated upstream outage for [`MemoryFeed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outage {
    /// Every fetch fails with [`UpstreamError::Unavailable`].
    Unavailable,
    /// Every fetch fails with [`UpstreamError::Unauthorized`].
    Unauthorized,
}

/// In-memory feed serving preloaded bars.
///
/// Records every request it receives, which makes it suitable for replaying
/// captured data offline and for asserting upstream traffic in tests.
#[derive(Debug, Default)]
pub struct MemoryFeed {
    series: Mutex<HashMap<(String, IntervalKind), Vec<Bar>>>,
    requests: Mutex<Vec<FetchRequest>>,
    outage: Mutex<Option<Outage>>,
}

impl MemoryFeed {
    /// Creates an empty feed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds bars for a symbol, keeping the stored series sorted.
    pub fn insert(&self, symbol: &str, kind: IntervalKind, bars: impl IntoIterator<Item = Bar>) {
        let mut series = lock(&self.series);
        let entry = series.entry((symbol.to_string(), kind)).or_default();
        entry.extend(bars);
        entry.sort_by_key(|b| b.timestamp);
    }

    /// Sets or clears a simulated outage.
    pub fn set_outage(&self, outage: Option<Outage>) {
        *lock(&self.outage) = outage;
    }

    /// Returns every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<FetchRequest> {
        lock(&self.requests).clone()
    }

    /// Returns the number of requests received so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl BarFeed for MemoryFeed {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Bar>, UpstreamError> {
        lock(&self.requests).push(request.clone());

        match *lock(&self.outage) {
            Some(Outage::Unavailable) => {
                return Err(UpstreamError::Unavailable("simulated outage".to_string()));
            }
            Some(Outage::Unauthorized) => {
                return Err(UpstreamError::Unauthorized("simulated rejection".to_string()));
            }
            None => {}
        }

        let bars: Vec<Bar> = lock(&self.series)
            .get(&(request.symbol.clone(), request.kind))
            .map(|all| {
                all.iter()
                    .filter(|b| b.timestamp >= request.start && b.timestamp <= request.end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default();

        if bars.is_empty() {
            return Err(UpstreamError::NoData {
                symbol: request.symbol.clone(),
            });
        }
        Ok(bars)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
