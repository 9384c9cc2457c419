//! Error types for chartfeed.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias for chartfeed operations.
pub type Result<T> = std::result::Result<T, ChartfeedError>;

/// Errors shared across the chartfeed crates.
#[derive(Error, Debug)]
pub enum ChartfeedError {
    /// A stored or received series could not be decoded.
    #[error("Malformed bar series: {0}")]
    Malformed(String),
}

/// Error for invalid date ranges.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateRangeError {
    /// Start date is after end date.
    #[error("Invalid date range: {start} > {end}")]
    InvalidRange {
        /// The start date.
        start: NaiveDate,
        /// The end date.
        end: NaiveDate,
    },
}
