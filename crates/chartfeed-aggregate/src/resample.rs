//! Single-pass bar resampling.

use std::num::NonZeroU32;

use chartfeed_types::{Bar, Interval};
use chrono::{DateTime, Utc};

/// Streaming bar aggregator.
///
/// Folds sorted finer-grained bars into buckets of a fixed width anchored to
/// absolute Unix time (`bucket_start = floor(ts / width) * width`). A bucket is
/// only ever emitted if at least one input bar fell into it.
#[derive(Debug)]
pub struct BarAggregator {
    width: i64,
    current: Option<BucketBuilder>,
}

impl BarAggregator {
    /// Creates a new aggregator for the given bucket width.
    #[must_use]
    pub const fn new(width_secs: NonZeroU32) -> Self {
        Self {
            width: width_secs.get() as i64,
            current: None,
        }
    }

    /// Creates a new aggregator for an interval.
    #[must_use]
    pub const fn for_interval(interval: Interval) -> Self {
        Self {
            width: interval.seconds() as i64,
            current: None,
        }
    }

    /// Returns the bucket width in seconds.
    #[must_use]
    pub const fn width_secs(&self) -> i64 {
        self.width
    }

    /// Processes a bar, potentially emitting the completed previous bucket.
    ///
    /// Input must be sorted by timestamp. Returns `Some(bar)` when `bar`
    /// starts a new bucket and the previous one is complete.
    pub fn push(&mut self, bar: &Bar) -> Option<Bar> {
        let ts = bar.timestamp.timestamp();

        match self.current.take() {
            Some(mut builder) if ts < builder.start + self.width => {
                builder.update(bar);
                self.current = Some(builder);
                None
            }
            Some(builder) => {
                self.current = Some(BucketBuilder::new(self.bucket_start(ts), bar));
                builder.finish()
            }
            None => {
                self.current = Some(BucketBuilder::new(self.bucket_start(ts), bar));
                None
            }
        }
    }

    /// Finishes aggregation, returning any remaining partial bucket.
    #[must_use]
    pub fn finish(self) -> Option<Bar> {
        self.current.and_then(BucketBuilder::finish)
    }

    const fn bucket_start(&self, ts: i64) -> i64 {
        ts.div_euclid(self.width) * self.width
    }
}

/// Accumulator for one output bucket.
#[derive(Debug)]
struct BucketBuilder {
    start: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl BucketBuilder {
    const fn new(start: i64, bar: &Bar) -> Self {
        Self {
            start,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }

    fn update(&mut self, bar: &Bar) {
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
        self.close = bar.close;
        self.volume += bar.volume;
    }

    fn finish(self) -> Option<Bar> {
        let timestamp: DateTime<Utc> = DateTime::from_timestamp(self.start, 0)?;
        Some(Bar::new(
            timestamp,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        ))
    }
}

/// Aggregates sorted bars into buckets of `width_secs` seconds.
///
/// Empty input yields empty output. Unsorted input is a caller error and
/// produces unspecified (but memory-safe) output.
#[must_use]
pub fn resample_secs(bars: &[Bar], width_secs: NonZeroU32) -> Vec<Bar> {
    fold(bars, BarAggregator::new(width_secs))
}

/// Aggregates sorted bars to the given interval.
#[must_use]
pub fn resample(bars: &[Bar], interval: Interval) -> Vec<Bar> {
    fold(bars, BarAggregator::for_interval(interval))
}

/// Aggregates one base series to several intervals.
///
/// The input is walked once per target; results keep the order of `targets`.
#[must_use]
pub fn resample_all(bars: &[Bar], targets: &[Interval]) -> Vec<(Interval, Vec<Bar>)> {
    targets
        .iter()
        .map(|interval| (*interval, resample(bars, *interval)))
        .collect()
}

fn fold(bars: &[Bar], mut aggregator: BarAggregator) -> Vec<Bar> {
    let mut out = Vec::new();
    for bar in bars {
        if let Some(done) = aggregator.push(bar) {
            out.push(done);
        }
    }
    out.extend(aggregator.finish());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn bar_at(secs: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
        Bar::new(
            Utc.timestamp_opt(secs, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume,
        )
    }

    /// A deterministic 1-second series starting at `start`.
    fn series(start: i64, len: i64) -> Vec<Bar> {
        (0..len)
            .map(|i| {
                let base = 100.0 + ((i * 7) % 13) as f64 - ((i * 3) % 5) as f64;
                bar_at(start + i, base, base + 0.5, base - 0.5, base + 0.25, (i % 4) as f64)
            })
            .collect()
    }

    fn width(secs: u32) -> NonZeroU32 {
        NonZeroU32::new(secs).unwrap()
    }

    #[test]
    fn test_empty_input() {
        assert!(resample(&[], Interval::Minute1).is_empty());
    }

    #[test]
    fn test_one_hour_into_single_bar() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 0, 0).unwrap().timestamp();
        let input = series(start, 3600);
        let out = resample(&input, Interval::Hour1);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].timestamp.timestamp(), start);
        assert_relative_eq!(out[0].open, input[0].open);
        assert_relative_eq!(out[0].close, input[3599].close);
    }

    #[test]
    fn test_bucket_alignment_and_extremes() {
        let input = series(1_700_000_003, 1000);
        for w in [5u32, 15, 45, 60, 2700] {
            let out = resample_secs(&input, width(w));
            for bar in &out {
                assert_eq!(bar.timestamp.timestamp() % i64::from(w), 0);
                let members = input.iter().filter(|b| {
                    let ts = b.timestamp.timestamp();
                    ts >= bar.timestamp.timestamp() && ts < bar.timestamp.timestamp() + i64::from(w)
                });
                for m in members {
                    assert!(bar.high >= m.open && bar.high >= m.close);
                    assert!(bar.low <= m.open && bar.low <= m.close);
                }
            }
        }
    }

    #[test]
    fn test_volume_is_conserved() {
        let input = series(1_700_000_000, 5000);
        let total_in: f64 = input.iter().map(|b| b.volume).sum();
        for interval in Interval::all() {
            let total_out: f64 = resample(&input, *interval).iter().map(|b| b.volume).sum();
            assert_relative_eq!(total_in, total_out);
        }
    }

    #[test]
    fn test_first_bucket_starts_before_first_bar() {
        let input = vec![bar_at(125, 1.0, 1.0, 1.0, 1.0, 1.0)];
        let out = resample(&input, Interval::Minute1);
        assert_eq!(out[0].timestamp.timestamp(), 120);
    }

    #[test]
    fn test_gaps_produce_no_buckets() {
        let input = vec![
            bar_at(0, 1.0, 2.0, 0.5, 1.5, 1.0),
            bar_at(1, 1.5, 3.0, 1.0, 2.0, 2.0),
            bar_at(600, 5.0, 6.0, 4.0, 5.5, 3.0),
        ];
        let out = resample(&input, Interval::Minute1);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].timestamp.timestamp(), 0);
        assert_relative_eq!(out[0].high, 3.0);
        assert_relative_eq!(out[0].low, 0.5);
        assert_relative_eq!(out[0].close, 2.0);
        assert_relative_eq!(out[0].volume, 3.0);
        assert_eq!(out[1].timestamp.timestamp(), 600);
    }

    #[test]
    fn test_exactly_full_buckets() {
        let input = series(0, 30);
        let out = resample(&input, Interval::Second10);
        assert_eq!(out.len(), 3);
        assert_relative_eq!(out[1].open, input[10].open);
        assert_relative_eq!(out[1].close, input[19].close);
    }

    #[test]
    fn test_streaming_matches_batch() {
        let input = series(42, 400);
        let mut agg = BarAggregator::for_interval(Interval::Second30);
        let mut streamed: Vec<Bar> = input.iter().filter_map(|b| agg.push(b)).collect();
        streamed.extend(agg.finish());
        assert_eq!(streamed, resample(&input, Interval::Second30));
    }

    #[test]
    fn test_resample_all_keeps_target_order() {
        let input = series(0, 120);
        let out = resample_all(&input, &[Interval::Minute1, Interval::Second5]);
        assert_eq!(out[0].0, Interval::Minute1);
        assert_eq!(out[0].1.len(), 2);
        assert_eq!(out[1].0, Interval::Second5);
        assert_eq!(out[1].1.len(), 24);
    }
}
