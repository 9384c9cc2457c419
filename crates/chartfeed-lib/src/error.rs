//! Query errors and their rejection class.

use chartfeed_cache::{CacheError, ResolveError, ResultError, SessionError};
use chartfeed_types::IntervalParseError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors returned by [`HistoryService`](crate::HistoryService).
#[derive(Error, Debug)]
pub enum QueryError {
    /// The query range is empty or inverted.
    #[error("Invalid range: start {start} is not before end {end}")]
    InvalidRange {
        /// Requested start.
        start: DateTime<Utc>,
        /// Requested end.
        end: DateTime<Utc>,
    },

    /// The interval is not one of the standard intervals.
    #[error(transparent)]
    Interval(#[from] IntervalParseError),

    /// An exchange, symbol or session contains a character reserved by the
    /// key namespace.
    #[error("Invalid {field}: {value:?}")]
    InvalidField {
        /// Name of the rejected field.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// The handle does not have the result-handle shape.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// The handle or session is unknown or expired.
    #[error("{0}")]
    NotFound(String),

    /// Upstream rejected the service credentials.
    #[error("Upstream rejected credentials: {0}")]
    Unauthorized(String),

    /// A stored result could not be decoded.
    #[error("{0}")]
    Corrupt(String),

    /// The cache backend failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// How an outer layer should answer a failed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The request itself is malformed.
    BadRequest,
    /// The handle or session does not exist (any more).
    NotFound,
    /// A backing service is down or misconfigured.
    Unavailable,
    /// Stored state is inconsistent.
    Internal,
}

impl Rejection {
    /// Returns the matching HTTP status code.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::Unavailable => 503,
            Self::Internal => 500,
        }
    }
}

impl QueryError {
    /// Classifies the error for the caller.
    #[must_use]
    pub const fn rejection(&self) -> Rejection {
        match self {
            Self::InvalidRange { .. }
            | Self::Interval(_)
            | Self::InvalidField { .. }
            | Self::InvalidHandle(_) => Rejection::BadRequest,
            Self::NotFound(_) => Rejection::NotFound,
            Self::Unauthorized(_) | Self::Cache(_) => Rejection::Unavailable,
            Self::Corrupt(_) => Rejection::Internal,
        }
    }
}

impl From<ResultError> for QueryError {
    fn from(e: ResultError) -> Self {
        match e {
            ResultError::NotFound(_) => Self::NotFound(e.to_string()),
            ResultError::InvalidHandle(h) => Self::InvalidHandle(h.0),
            ResultError::Corrupt { .. } => Self::Corrupt(e.to_string()),
            ResultError::Cache(e) => Self::Cache(e),
        }
    }
}

impl From<SessionError> for QueryError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) => Self::NotFound(e.to_string()),
            SessionError::Cache(e) => Self::Cache(e),
        }
    }
}

impl From<ResolveError> for QueryError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::Unauthorized(source) => Self::Unauthorized(source.to_string()),
            ResolveError::Cache(e) => Self::Cache(e),
        }
    }
}
