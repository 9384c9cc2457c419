//! Materialized result sets and paging.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chartfeed_types::{Bar, Interval, SeriesKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::codec::{decode_bars, encode_bars};
use crate::keys::{self, HANDLE_PREFIX};
use crate::{CacheError, CacheStore, HandleError, ResultError};

/// Opaque reference to a materialized result: `chart_data:{session}:{id}`.
///
/// Derived handles append `:{interval}` and remain valid handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResultHandle {
    raw: String,
    session_end: usize,
}

impl ResultHandle {
    /// Creates a fresh handle in `session`'s namespace.
    #[must_use]
    pub fn generate(session: &str) -> Self {
        let raw = keys::handle_key(session, &Uuid::new_v4().to_string());
        Self {
            session_end: HANDLE_PREFIX.len() + 1 + session.len(),
            raw,
        }
    }

    /// Validates a handle string without touching the store.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError`] unless the string is `chart_data:{session}:{id}`
    /// with non-empty session and id.
    pub fn parse(raw: &str) -> Result<Self, HandleError> {
        let invalid = || HandleError(raw.to_string());
        let body = raw
            .strip_prefix(HANDLE_PREFIX)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(invalid)?;
        let (session, id) = body.split_once(':').ok_or_else(invalid)?;
        if session.is_empty() || id.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            raw: raw.to_string(),
            session_end: HANDLE_PREFIX.len() + 1 + session.len(),
        })
    }

    /// Returns the handle as a string (also its store key).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the owning session token.
    #[must_use]
    pub fn session(&self) -> &str {
        &self.raw[HANDLE_PREFIX.len() + 1..self.session_end]
    }

    /// Returns the handle a background fan-out stores `interval` under.
    #[must_use]
    pub fn derived(&self, interval: Interval) -> Self {
        Self {
            raw: format!("{}:{interval}", self.raw),
            session_end: self.session_end,
        }
    }
}

impl fmt::Display for ResultHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ResultHandle {
    type Err = HandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResultHandle {
    type Error = HandleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ResultHandle> for String {
    fn from(handle: ResultHandle) -> Self {
        handle.raw
    }
}

/// An arbitrary slice of a materialized result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Bars in the slice.
    pub bars: Vec<Bar>,
    /// Requested offset.
    pub offset: usize,
    /// Requested limit.
    pub limit: usize,
    /// Length of the whole series.
    pub total: usize,
}

impl Page {
    /// Slices `series` at `[offset, offset + limit)`, clamped to its length.
    #[must_use]
    pub fn slice(series: &[Bar], offset: usize, limit: usize) -> Self {
        let total = series.len();
        let start = offset.min(total);
        let end = offset.saturating_add(limit).min(total);
        Self {
            bars: series[start..end].to_vec(),
            offset,
            limit,
            total,
        }
    }
}

/// The tail-biased first page of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialPage {
    /// The last `tail_limit` bars of the series.
    pub bars: Vec<Bar>,
    /// Index of the first returned bar within the series.
    pub offset: usize,
    /// Length of the whole series.
    pub total: usize,
    /// True if older bars exist before `offset`.
    pub is_partial: bool,
}

impl InitialPage {
    /// Takes the last `tail_limit` bars of `series`.
    #[must_use]
    pub fn tail(series: &[Bar], tail_limit: usize) -> Self {
        let total = series.len();
        let offset = total.saturating_sub(tail_limit);
        let bars = series[offset..].to_vec();
        Self {
            is_partial: total > bars.len(),
            bars,
            offset,
            total,
        }
    }
}

/// Stores computed series under handles and serves pages from them.
#[derive(Debug, Clone)]
pub struct ResultStore {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ResultStore {
    /// Creates a result store whose entries live for `ttl`.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Returns the entry TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stores the whole series under a fresh handle in `session`'s namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the series cannot be written.
    pub async fn materialize(&self, session: &str, bars: &[Bar]) -> Result<ResultHandle, CacheError> {
        let handle = ResultHandle::generate(session);
        self.store_at(&handle, bars).await?;
        debug!(handle = %handle, total = bars.len(), "result materialized");
        Ok(handle)
    }

    /// Stores a series under an existing handle, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the series cannot be written.
    pub async fn store_at(&self, handle: &ResultHandle, bars: &[Bar]) -> Result<(), CacheError> {
        self.store
            .set(handle.as_str(), encode_bars(bars)?, self.ttl)
            .await
    }

    /// Loads the full series behind a handle.
    ///
    /// # Errors
    ///
    /// Returns [`ResultError::NotFound`] for an unknown or expired handle.
    pub async fn load(&self, handle: &ResultHandle) -> Result<Vec<Bar>, ResultError> {
        let raw = self
            .store
            .get(handle.as_str())
            .await?
            .ok_or_else(|| ResultError::NotFound(handle.to_string()))?;
        decode_bars(&raw).map_err(|e| ResultError::Corrupt {
            handle: handle.to_string(),
            reason: e.to_string(),
        })
    }

    /// Returns `[offset, offset + limit)` of the series behind `handle`.
    ///
    /// An offset at or past the end yields an empty slice with the real total.
    ///
    /// # Errors
    ///
    /// Returns [`ResultError::InvalidHandle`] before any lookup if `handle` is
    /// malformed, and [`ResultError::NotFound`] if it is unknown or expired.
    pub async fn page(&self, handle: &str, offset: usize, limit: usize) -> Result<Page, ResultError> {
        let handle = ResultHandle::parse(handle)?;
        let series = self.load(&handle).await?;
        Ok(Page::slice(&series, offset, limit))
    }

    /// Returns the tail-biased first page of the series behind `handle`.
    ///
    /// # Errors
    ///
    /// Same as [`ResultStore::page`].
    pub async fn initial_page(
        &self,
        handle: &str,
        tail_limit: usize,
    ) -> Result<InitialPage, ResultError> {
        let handle = ResultHandle::parse(handle)?;
        let series = self.load(&handle).await?;
        Ok(InitialPage::tail(&series, tail_limit))
    }

    /// Returns a previously cached aggregated series for an exact query range.
    ///
    /// A corrupt entry is reported as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn cached_range(
        &self,
        series: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        session: &str,
    ) -> Result<Option<Vec<Bar>>, CacheError> {
        let key = keys::range_key(series, start, end, session);
        let Some(raw) = self.store.get(&key).await?.filter(|v| !v.is_empty()) else {
            return Ok(None);
        };
        match decode_bars(&raw) {
            Ok(bars) => Ok(Some(bars)),
            Err(e) => {
                warn!(key = %key, error = %e, "corrupt aggregated cache entry");
                Ok(None)
            }
        }
    }

    /// Caches an aggregated series for an exact query range.
    ///
    /// # Errors
    ///
    /// Returns an error if the series cannot be written.
    pub async fn store_range(
        &self,
        series: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        session: &str,
        bars: &[Bar],
    ) -> Result<(), CacheError> {
        let key = keys::range_key(series, start, end, session);
        self.store.set(&key, encode_bars(bars)?, self.ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use chrono::TimeZone;

    fn numbered(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let ts = Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap();
                let p = i as f64;
                Bar::new(ts, p, p, p, p, 1.0)
            })
            .collect()
    }

    fn result_store() -> ResultStore {
        ResultStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(3600))
    }

    #[test]
    fn test_handle_parse() {
        let handle = ResultHandle::parse("chart_data:tok:abc").unwrap();
        assert_eq!(handle.session(), "tok");
        assert_eq!(handle.derived(Interval::Minute5).as_str(), "chart_data:tok:abc:5m");
        assert_eq!(handle.derived(Interval::Minute5).session(), "tok");
        assert!(ResultHandle::parse("chart_data:tok:abc:5m").is_ok());

        for bad in ["", "chart_data:", "chart_data:tok", "chart_data::abc", "chart_data:tok:", "ohlc:x:y"] {
            assert!(ResultHandle::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_generated_handle_is_valid() {
        let handle = ResultHandle::generate("s1");
        assert_eq!(ResultHandle::parse(handle.as_str()).unwrap(), handle);
        assert_eq!(handle.session(), "s1");
    }

    #[test]
    fn test_initial_page_is_tail_biased() {
        let series = numbered(12_000);
        let page = InitialPage::tail(&series, 5000);
        assert_eq!(page.offset, 7000);
        assert_eq!(page.total, 12_000);
        assert_eq!(page.bars.len(), 5000);
        assert!(page.is_partial);
        assert_eq!(page.bars[0], series[7000]);

        let small = InitialPage::tail(&series[..10], 5000);
        assert_eq!(small.offset, 0);
        assert!(!small.is_partial);
    }

    #[tokio::test]
    async fn test_pages_past_end_and_clamped() {
        let results = result_store();
        let series = numbered(10_000);
        let handle = results.materialize("s1", &series).await.unwrap();

        let page = results.page(handle.as_str(), 9000, 5000).await.unwrap();
        assert_eq!(page.bars.len(), 1000);
        assert_eq!(page.total, 10_000);
        assert_eq!(page.bars[0], series[9000]);
        assert_eq!(page.bars[999], series[9999]);

        let page = results.page(handle.as_str(), 10_000, 100).await.unwrap();
        assert!(page.bars.is_empty());
        assert_eq!(page.total, 10_000);

        let first = results.initial_page(handle.as_str(), 5000).await.unwrap();
        assert_eq!(first.offset, 5000);
        assert!(first.is_partial);
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_handles() {
        let results = result_store();
        let err = results.page("chart_data:s1:missing", 0, 10).await.unwrap_err();
        assert!(matches!(err, ResultError::NotFound(_)));

        let err = results.page("not-a-handle", 0, 10).await.unwrap_err();
        assert!(matches!(err, ResultError::InvalidHandle(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_expires_after_ttl() {
        let results = result_store();
        let handle = results.materialize("s1", &numbered(3)).await.unwrap();
        tokio::time::advance(Duration::from_secs(3601)).await;
        let err = results.page(handle.as_str(), 0, 10).await.unwrap_err();
        assert!(matches!(err, ResultError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_range_cache_roundtrip_and_corruption() {
        let store = Arc::new(MemoryStore::new());
        let results = ResultStore::new(store.clone(), Duration::from_secs(3600));
        let series = SeriesKey::new("NYSE", "IBM", Interval::Minute1);
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();

        assert!(results.cached_range(&series, start, end, "s1").await.unwrap().is_none());
        results
            .store_range(&series, start, end, "s1", &numbered(4))
            .await
            .unwrap();
        let cached = results.cached_range(&series, start, end, "s1").await.unwrap();
        assert_eq!(cached.unwrap().len(), 4);

        store
            .set(&keys::range_key(&series, start, end, "s1"), "oops".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(results.cached_range(&series, start, end, "s1").await.unwrap().is_none());
    }
}
