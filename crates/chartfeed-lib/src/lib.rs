//! Session-scoped OHLCV history cache with tail-biased paging.
//!
//! This is a facade crate: [`HistoryService`] ties the base cache, the result
//! store, the session registry and the fan-out pool together, and the rest of
//! the workspace is re-exported for convenient access.
//!
//! # Quick Start
//!
//! ```ignore
//! use chartfeed_lib::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_env();
//!     let store = Arc::new(RedisStore::connect(&settings.redis_url).await?);
//!     let feed = Arc::new(Supervisor::new(
//!         HttpConnector::new(settings.upstream.clone()),
//!         settings.upstream.backoff(),
//!     ));
//!     let service = HistoryService::new(store, feed, &settings);
//!
//!     let session = service.initiate_session().await?;
//!     let end = chrono::Utc::now();
//!     let start = end - chrono::Duration::hours(6);
//!     let first = service
//!         .get_initial(&ChartQuery::new("NASDAQ", "AAPL", "1m", start, end, &session))
//!         .await?;
//!     if let Some(handle) = &first.handle {
//!         let older = service.get_page(handle, 0, 500).await?;
//!         println!("{} of {} bars", older.bars.len(), older.total);
//!     }
//!     Ok(())
//! }
//! ```

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod service;

pub use config::Settings;
pub use error::{QueryError, Rejection};
pub use service::{ChartQuery, HistoryService, InitialResponse, NO_DATA_MESSAGE};

// Re-export core types
pub use chartfeed_types::*;

pub use chartfeed_aggregate::{BarAggregator, resample, resample_all, resample_secs};

pub use chartfeed_upstream::{
    BackoffPolicy, BarFeed, ClientConfig, Connection, Connector, FetchRequest, HttpConnection,
    HttpConnector, IntervalKind, MemoryFeed, Outage, Supervisor, UpstreamError,
};

pub use chartfeed_cache::{
    BaseCache, BaseSeries, CacheError, CacheStore, HandleError, InitialPage, MemoryStore, Page,
    RedisStore, ResolveError, ResultError, ResultHandle, ResultStore, SessionError,
    SessionRegistry, SweepReport, keys,
};

pub use chartfeed_jobs::{
    AggregationJob, BarStore, DEFAULT_TARGETS, FanoutJob, FanoutPool, FileBarStore, IntervalTask,
    JobId, JobStatus, StoreError, SweepScheduler, run_history_job,
};

/// Prelude module for convenient imports.
///
/// ```
/// use chartfeed_lib::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    pub use chartfeed_types::{Bar, ChartfeedError, DateRange, Interval, SeriesKey};

    pub use chartfeed_cache::{CacheStore, MemoryStore, Page, RedisStore};

    pub use chartfeed_upstream::{BarFeed, ClientConfig, HttpConnector, MemoryFeed, Supervisor};

    pub use chartfeed_jobs::{FanoutPool, SweepScheduler};

    pub use crate::{ChartQuery, HistoryService, InitialResponse, QueryError, Settings};
}
