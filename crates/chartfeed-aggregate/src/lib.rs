//! Bar aggregation engine for the chartfeed historical bar service.
//!
//! This crate derives coarser OHLCV bars from the 1-second base series:
//!
//! - [`resample`] - Aggregate a sorted series to one [`Interval`]
//! - [`resample_all`] - Aggregate one series to several intervals
//! - [`BarAggregator`] - Streaming single-pass aggregator
//!
//! [`Interval`]: chartfeed_types::Interval

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod resample;

pub use resample::{BarAggregator, resample, resample_all, resample_secs};
