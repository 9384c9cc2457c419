//! Day-partitioned cache of the 1-second base series.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chartfeed_types::{Bar, DateRange, SeriesKey, day_end, day_start};
use chartfeed_upstream::{BarFeed, FetchRequest};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use crate::codec::{decode_bars, encode_bars};
use crate::{CacheStore, ResolveError, keys};

/// A resolved 1-second series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseSeries {
    /// Bars in the requested range, sorted ascending.
    pub bars: Vec<Bar>,
    /// False if some missing days could not be filled from upstream.
    pub complete: bool,
}

/// Cache-aside resolver for 1-second bars.
///
/// Each UTC calendar day of a series is one cache entry. A stored empty array
/// is a valid "no bars that day" entry and is never refetched.
#[derive(Debug, Clone)]
pub struct BaseCache {
    store: Arc<dyn CacheStore>,
    feed: Arc<dyn BarFeed>,
    ttl: Duration,
}

impl BaseCache {
    /// Creates a resolver writing day entries with the given TTL.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, feed: Arc<dyn BarFeed>, ttl: Duration) -> Self {
        Self { store, feed, ttl }
    }

    /// Returns the 1-second series for `series` in `[start, end]`, sorted.
    ///
    /// Cached days are read in one batch; every missing or corrupt day is
    /// filled by a single upstream fetch and written back in one batch. An
    /// upstream failure other than rejected credentials yields a partial
    /// series and caches nothing for the missing days.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Cache`] if the cache read fails and
    /// [`ResolveError::Unauthorized`] if upstream rejects the credentials.
    pub async fn resolve_base_series(
        &self,
        series: &SeriesKey,
        session: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, ResolveError> {
        Ok(self.resolve(series, session, start, end).await?.bars)
    }

    /// Same as [`BaseCache::resolve_base_series`], also reporting whether
    /// every day of the range was served or filled.
    ///
    /// # Errors
    ///
    /// Same as [`BaseCache::resolve_base_series`].
    pub async fn resolve(
        &self,
        series: &SeriesKey,
        session: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BaseSeries, ResolveError> {
        let Ok(range) = DateRange::covering(start, end) else {
            return Ok(BaseSeries {
                bars: Vec::new(),
                complete: true,
            });
        };

        let days: Vec<NaiveDate> = range.days().collect();
        let day_keys: Vec<String> = days
            .iter()
            .map(|day| keys::base_day_key(series, *day, session))
            .collect();
        let cached = self.store.get_many(&day_keys).await?;

        let mut bars = Vec::new();
        let mut missing = Vec::new();
        for ((day, key), value) in days.iter().zip(&day_keys).zip(cached) {
            match value.filter(|v| !v.is_empty()).map(|v| decode_bars(&v)) {
                Some(Ok(day_bars)) => {
                    debug!(%day, count = day_bars.len(), "base cache hit");
                    bars.extend(day_bars);
                }
                Some(Err(e)) => {
                    warn!(key = %key, error = %e, "corrupt base cache entry, refetching");
                    missing.push(*day);
                }
                None => {
                    debug!(%day, "base cache miss");
                    missing.push(*day);
                }
            }
        }

        let mut complete = true;
        if !missing.is_empty() {
            match self.fill_days(series, session, &missing).await? {
                Some(filled) => bars.extend(filled),
                None => complete = false,
            }
        }

        bars.sort_by_key(|b| b.timestamp);
        bars.retain(|b| b.timestamp >= start && b.timestamp <= end);
        Ok(BaseSeries { bars, complete })
    }

    /// Fetches `missing` (sorted ascending) in one upstream call and writes
    /// every one of those days back, returning the fetched bars for them.
    ///
    /// Returns `None` when upstream produced nothing, in which case nothing
    /// is written.
    async fn fill_days(
        &self,
        series: &SeriesKey,
        session: &str,
        missing: &[NaiveDate],
    ) -> Result<Option<Vec<Bar>>, ResolveError> {
        let (Some(first), Some(last)) = (missing.first(), missing.last()) else {
            return Ok(Some(Vec::new()));
        };
        let request = FetchRequest::seconds(&series.symbol, 1, day_start(*first), day_end(*last));
        info!(
            series = %series,
            from = %first,
            to = %last,
            days = missing.len(),
            "filling base cache gap from upstream"
        );

        let fetched = match self.feed.fetch(&request).await {
            Ok(bars) => bars,
            Err(e) if e.is_unauthorized() => {
                error!(series = %series, error = %e, "upstream rejected credentials");
                return Err(ResolveError::Unauthorized(e));
            }
            Err(e) if e.is_no_data() => {
                info!(series = %series, from = %first, to = %last, "upstream has no data for range");
                return Ok(None);
            }
            Err(e) => {
                warn!(series = %series, error = %e, "upstream fetch failed, serving partial series");
                return Ok(None);
            }
        };
        if fetched.is_empty() {
            return Ok(None);
        }

        // Days inside the span that were cache hits are already in the accumulator
        let mut by_day: BTreeMap<NaiveDate, Vec<Bar>> =
            missing.iter().map(|day| (*day, Vec::new())).collect();
        for bar in fetched {
            if let Some(bucket) = by_day.get_mut(&bar.timestamp.date_naive()) {
                bucket.push(bar);
            }
        }

        let mut entries = Vec::with_capacity(by_day.len());
        for (day, day_bars) in &mut by_day {
            day_bars.sort_by_key(|b| b.timestamp);
            match encode_bars(day_bars) {
                Ok(value) => entries.push((keys::base_day_key(series, *day, session), value)),
                Err(e) => warn!(%day, error = %e, "failed to encode base day"),
            }
        }
        if let Err(e) = self.store.set_many(&entries, self.ttl).await {
            warn!(series = %series, error = %e, "base cache write failed");
        } else {
            debug!(series = %series, days = entries.len(), "base cache days written");
        }

        Ok(Some(by_day.into_values().flatten().collect()))
    }
}
