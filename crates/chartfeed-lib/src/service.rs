//! The history query surface.

use std::sync::Arc;

use chartfeed_aggregate::resample;
use chartfeed_cache::{
    BaseCache, CacheStore, InitialPage, Page, ResultStore, SessionRegistry, SweepReport, keys,
};
use chartfeed_jobs::{FanoutJob, FanoutPool};
use chartfeed_types::{Bar, Interval, SeriesKey};
use chartfeed_upstream::{BarFeed, FetchRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{QueryError, Settings};

/// Message attached to a response that has no bars.
pub const NO_DATA_MESSAGE: &str = "No data available for the requested range";

/// A request for the first page of a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartQuery {
    /// Exchange of the instrument.
    pub exchange: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Interval label such as `5m` or `1h`.
    pub interval: String,
    /// First instant (inclusive).
    pub start: DateTime<Utc>,
    /// Last instant (inclusive).
    pub end: DateTime<Utc>,
    /// Session token owning every key this query writes.
    pub session: String,
    /// Overrides the configured initial page size.
    #[serde(default)]
    pub page_limit: Option<usize>,
}

impl ChartQuery {
    /// Creates a query using the configured initial page size.
    #[must_use]
    pub fn new(
        exchange: impl Into<String>,
        symbol: impl Into<String>,
        interval: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        session: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            interval: interval.into(),
            start,
            end,
            session: session.into(),
            page_limit: None,
        }
    }

    /// Sets the initial page size for this query.
    #[must_use]
    pub const fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = Some(limit);
        self
    }

    /// Rejects exchanges, symbols and sessions that cannot be used in keys.
    fn validate(&self) -> Result<(), QueryError> {
        for (field, value) in [
            ("exchange", &self.exchange),
            ("symbol", &self.symbol),
            ("session", &self.session),
        ] {
            if !keys::is_valid_segment(value) {
                return Err(QueryError::InvalidField {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

/// The first page of a query plus the handle to fetch the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialResponse {
    /// Handle of the materialized series, absent when there is no data.
    pub handle: Option<String>,
    /// Interval of the returned bars.
    pub interval: Interval,
    /// The most recent bars of the series.
    pub bars: Vec<Bar>,
    /// Index of the first returned bar within the series.
    pub offset: usize,
    /// Length of the whole series.
    pub total: usize,
    /// True if older bars can be paged in.
    pub is_partial: bool,
    /// Human-readable note, set when there is nothing to show.
    pub message: Option<String>,
}

impl InitialResponse {
    fn empty(interval: Interval) -> Self {
        Self {
            handle: None,
            interval,
            bars: Vec::new(),
            offset: 0,
            total: 0,
            is_partial: false,
            message: Some(NO_DATA_MESSAGE.to_string()),
        }
    }
}

/// Resolves, materializes and pages historical bars for chart clients.
///
/// Cheap to clone; clones share the cache backend, the upstream feed and the
/// fan-out pool.
#[derive(Debug, Clone)]
pub struct HistoryService {
    base: BaseCache,
    results: ResultStore,
    sessions: SessionRegistry,
    feed: Arc<dyn BarFeed>,
    fanout: Option<Arc<FanoutPool>>,
    initial_page_limit: usize,
}

impl HistoryService {
    /// Creates a service over a cache backend and an upstream feed.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, feed: Arc<dyn BarFeed>, settings: &Settings) -> Self {
        Self {
            base: BaseCache::new(Arc::clone(&store), Arc::clone(&feed), settings.base_cache_ttl),
            results: ResultStore::new(Arc::clone(&store), settings.result_ttl),
            sessions: SessionRegistry::new(
                store,
                settings.session_timeout,
                settings.session_marker_ttl,
            ),
            feed,
            fanout: None,
            initial_page_limit: settings.initial_page_limit.max(1),
        }
    }

    /// Hands every served 1-second series to `pool` for interval fan-out.
    #[must_use]
    pub fn with_fanout(mut self, pool: Arc<FanoutPool>) -> Self {
        self.fanout = Some(pool);
        self
    }

    /// Returns the result store, for wiring background workers.
    #[must_use]
    pub const fn results(&self) -> &ResultStore {
        &self.results
    }

    /// Returns the session registry, for wiring the sweep scheduler.
    #[must_use]
    pub const fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Resolves a series, stores the whole of it under a new handle and
    /// returns its most recent bars.
    ///
    /// An empty series is not stored: the response carries no handle and a
    /// message instead.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Interval`] or [`QueryError::InvalidRange`] before
    /// any I/O, [`QueryError::Unauthorized`] if upstream rejects the
    /// credentials, and [`QueryError::Cache`] if the cache backend fails.
    pub async fn get_initial(&self, query: &ChartQuery) -> Result<InitialResponse, QueryError> {
        query.validate()?;
        let interval: Interval = query.interval.parse()?;
        let (start, end) = (query.start, query.end);
        if start >= end {
            return Err(QueryError::InvalidRange { start, end });
        }
        let series = SeriesKey::new(&query.exchange, &query.symbol, interval);
        let session = query.session.as_str();

        let (bars, base) = if interval.is_daily() {
            (Arc::new(self.fetch_daily(&series, start, end).await?), None)
        } else if interval.is_base() {
            let base = Arc::new(self.base.resolve(&series, session, start, end).await?.bars);
            (Arc::clone(&base), Some(base))
        } else if let Some(cached) = self.results.cached_range(&series, start, end, session).await? {
            debug!(series = %series, count = cached.len(), "aggregated range cache hit");
            (Arc::new(cached), None)
        } else {
            let resolved = self.base.resolve(&series.base(), session, start, end).await?;
            let bars = resample(&resolved.bars, interval);
            // A partial series must be recomputed once upstream recovers
            if resolved.complete && !bars.is_empty() {
                if let Err(e) = self
                    .results
                    .store_range(&series, start, end, session, &bars)
                    .await
                {
                    warn!(series = %series, error = %e, "aggregated range cache write failed");
                }
            }
            (Arc::new(bars), Some(Arc::new(resolved.bars)))
        };

        if bars.is_empty() {
            info!(series = %series, %start, %end, "query produced no bars");
            return Ok(InitialResponse::empty(interval));
        }

        let handle = self.results.materialize(session, &bars).await?;
        let limit = query
            .page_limit
            .filter(|n| *n > 0)
            .unwrap_or(self.initial_page_limit);
        let page = InitialPage::tail(&bars, limit);
        info!(
            series = %series,
            handle = %handle,
            total = page.total,
            returned = page.bars.len(),
            "query materialized"
        );

        match (&self.fanout, base) {
            (Some(pool), Some(base)) if !base.is_empty() => {
                pool.enqueue(FanoutJob {
                    handle: handle.clone(),
                    base,
                    requested: interval,
                });
            }
            _ => {}
        }

        Ok(InitialResponse {
            handle: Some(handle.into()),
            interval,
            bars: page.bars,
            offset: page.offset,
            total: page.total,
            is_partial: page.is_partial,
            message: None,
        })
    }

    /// Returns `[offset, offset + limit)` of a materialized series.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidHandle`] for a malformed handle and
    /// [`QueryError::NotFound`] for an unknown or expired one.
    pub async fn get_page(
        &self,
        handle: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page, QueryError> {
        Ok(self.results.page(handle, offset, limit).await?)
    }

    /// Starts a new session and returns its token.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Cache`] if the marker cannot be written.
    pub async fn initiate_session(&self) -> Result<String, QueryError> {
        Ok(self.sessions.initiate().await?)
    }

    /// Keeps a session alive.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] if the session has already expired.
    pub async fn heartbeat(&self, token: &str) -> Result<(), QueryError> {
        Ok(self.sessions.heartbeat(token).await?)
    }

    /// Runs one expiry sweep.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Cache`] if the backend fails.
    pub async fn sweep(&self) -> Result<SweepReport, QueryError> {
        Ok(self.sessions.sweep().await?)
    }

    async fn fetch_daily(
        &self,
        series: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, QueryError> {
        let request = FetchRequest::daily(&series.symbol, start, end);
        match self.feed.fetch(&request).await {
            Ok(mut bars) => {
                bars.sort_by_key(|b| b.timestamp);
                bars.retain(|b| b.timestamp >= start && b.timestamp <= end);
                Ok(bars)
            }
            Err(e) if e.is_unauthorized() => {
                error!(series = %series, error = %e, "upstream rejected credentials");
                Err(QueryError::Unauthorized(e.to_string()))
            }
            Err(e) if e.is_no_data() => {
                info!(series = %series, "upstream has no daily data for range");
                Ok(Vec::new())
            }
            Err(e) => {
                warn!(series = %series, error = %e, "daily fetch failed");
                Ok(Vec::new())
            }
        }
    }
}
