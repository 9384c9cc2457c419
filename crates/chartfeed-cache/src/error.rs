//! Error types for the cache layer.

use thiserror::Error;

/// Errors raised by a [`CacheStore`](crate::CacheStore) backend.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Redis command or connection failure.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A value could not be encoded for storage.
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A handle string that does not have the materialized-result shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid result handle: {0:?}")]
pub struct HandleError(pub String);

/// Errors raised while reading materialized results.
#[derive(Error, Debug)]
pub enum ResultError {
    /// The handle is unknown or its TTL has elapsed.
    #[error("Result {0} not found or expired")]
    NotFound(String),

    /// The handle string was rejected before lookup.
    #[error(transparent)]
    InvalidHandle(#[from] HandleError),

    /// The stored value could not be decoded.
    #[error("Stored result {handle} is corrupt: {reason}")]
    Corrupt {
        /// Handle of the corrupt entry.
        handle: String,
        /// Decoder message.
        reason: String,
    },

    /// Backend failure.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Errors raised by the session registry.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session marker is missing (never issued or already swept).
    #[error("Session {0} not found or expired")]
    NotFound(String),

    /// Backend failure.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Errors raised while resolving the base series.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Upstream rejected the credentials; the query cannot be served.
    #[error("Upstream rejected credentials: {0}")]
    Unauthorized(#[source] chartfeed_upstream::UpstreamError),

    /// The cache could not be read.
    #[error(transparent)]
    Cache(#[from] CacheError),
}
