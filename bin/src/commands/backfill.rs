//! Backfill command.
//!
//! Pulls 1-second history from upstream one request per day, stores it in the
//! local bar store and aggregates it to the target intervals.

use crate::display::{parse_range, print_json};
use anyhow::{Context, Result, bail};
use chartfeed_lib::{
    BarStore, DEFAULT_TARGETS, FetchRequest, FileBarStore, Interval, day_end, day_start,
    run_history_job,
};
use chartfeed_lib::prelude::*;
use futures::{StreamExt, stream};
use std::path::PathBuf;
use tracing::{info, warn};

/// Fetch, store and aggregate history for one instrument.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn backfill(
    settings: &Settings,
    exchange: &str,
    symbol: &str,
    start: &str,
    end: &str,
    targets: &[String],
    data_dir: Option<PathBuf>,
    concurrency: usize,
) -> Result<()> {
    let (start, end) = parse_range(start, end)?;
    let targets: Vec<Interval> = if targets.is_empty() {
        DEFAULT_TARGETS.to_vec()
    } else {
        targets
            .iter()
            .map(|t| t.parse::<Interval>())
            .collect::<Result<_, _>>()?
    };
    let store = match data_dir {
        Some(path) => FileBarStore::new(path)?,
        None => FileBarStore::with_default_path()?,
    };
    info!(path = %store.base_path().display(), "using bar store");

    let feed = super::upstream(settings);
    let range = DateRange::covering(start, end)?;
    let mut days = stream::iter(range.days())
        .map(|day| {
            let feed = Arc::clone(&feed);
            let request = FetchRequest::seconds(
                symbol,
                1,
                day_start(day).max(start),
                day_end(day).min(end),
            );
            async move { (day, feed.fetch(&request).await) }
        })
        .buffer_unordered(concurrency.max(1));

    let mut bars = Vec::new();
    let mut failed_days = 0usize;
    while let Some((day, result)) = days.next().await {
        match result {
            Ok(day_bars) => {
                info!(%day, bars = day_bars.len(), "day fetched");
                bars.extend(day_bars);
            }
            Err(e) if e.is_unauthorized() => bail!("Upstream rejected credentials: {e}"),
            Err(e) if e.is_no_data() => info!(%day, "no data"),
            Err(e) => {
                warn!(%day, error = %e, "day fetch failed");
                failed_days += 1;
            }
        }
    }

    let series = SeriesKey::new(exchange, symbol, Interval::Second1);
    let (exchange, symbol) = (exchange.to_string(), symbol.to_string());
    let job = tokio::task::spawn_blocking(move || {
        store.upsert(&series, &bars)?;
        run_history_job(&store, &exchange, &symbol, start, end, &targets)
    })
    .await
    .context("Aggregation task panicked")?
    .context("Aggregation failed")?;

    if failed_days > 0 {
        warn!(failed_days, "some days could not be fetched, rerun to fill them");
    }
    print_json(&job)
}
