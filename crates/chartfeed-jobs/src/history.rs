//! Full-history aggregation into the durable store.

use chartfeed_aggregate::resample;
use chartfeed_types::{Interval, SeriesKey};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{AggregationJob, BarStore, JobStatus, StoreError};

/// Intervals produced when no targets are given.
pub const DEFAULT_TARGETS: [Interval; 6] = [
    Interval::Second5,
    Interval::Minute1,
    Interval::Minute5,
    Interval::Minute15,
    Interval::Hour1,
    Interval::Day1,
];

/// Aggregates the stored 1-second series of an instrument to each target.
///
/// The base series is read once. Each target is upserted independently; a
/// failing target is recorded on its task and the others still run.
///
/// # Errors
///
/// Returns an error only if the base series cannot be read.
pub fn run_history_job(
    store: &dyn BarStore,
    exchange: &str,
    symbol: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    targets: &[Interval],
) -> Result<AggregationJob, StoreError> {
    let mut job = AggregationJob::new(exchange, symbol, start, end, targets);
    job.mark_started();
    info!(job = %job.id, exchange, symbol, %start, %end, "history aggregation started");

    let base_key = SeriesKey::new(exchange, symbol, Interval::Second1);
    let base = match store.read_range(&base_key, start, end) {
        Ok(base) => base,
        Err(e) => {
            job.mark_failed(&e.to_string());
            return Err(e);
        }
    };
    job.base_bars = base.len();
    if base.is_empty() {
        info!(job = %job.id, "no base bars in range, nothing to aggregate");
    }

    for task in &mut job.tasks {
        task.status = JobStatus::Running;
        let bars = resample(&base, task.interval);
        if bars.is_empty() {
            task.status = JobStatus::Completed;
            continue;
        }
        match store.upsert(&base_key.with_interval(task.interval), &bars) {
            Ok(written) => {
                task.bars_written = written;
                task.status = JobStatus::Completed;
                info!(interval = %task.interval, bars = written, "aggregated interval stored");
            }
            Err(e) => {
                warn!(interval = %task.interval, error = %e, "aggregated interval failed");
                task.status = JobStatus::Failed;
                task.error_message = Some(e.to_string());
            }
        }
    }

    job.mark_finished();
    info!(
        job = %job.id,
        status = %job.status,
        bars = job.bars_written(),
        failed = job.failed_count(),
        "history aggregation finished"
    );
    Ok(job)
}
