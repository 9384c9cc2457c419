//! Core types for the chartfeed historical bar service.
//!
//! This crate provides the fundamental data structures used throughout chartfeed:
//!
//! - [`Bar`] - One OHLCV sample for a fixed time bucket
//! - [`Interval`] - The enumerated set of supported bar widths
//! - [`SeriesKey`] - Identifies a logical time series
//! - [`DateRange`] - UTC calendar-day range used for day partitioning

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod bar;
mod date_range;
mod error;
mod interval;
mod series;

pub use bar::Bar;
pub use date_range::{DateRange, DayIterator, day_end, day_start};
pub use error::{ChartfeedError, DateRangeError, Result};
pub use interval::{Interval, IntervalParseError};
pub use series::SeriesKey;
