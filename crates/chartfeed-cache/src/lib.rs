//! Cache layer for chartfeed.
//!
//! - [`CacheStore`] - Key/value store with per-key expiry ([`RedisStore`], [`MemoryStore`])
//! - [`BaseCache`] - Day-partitioned cache-aside for 1-second bars
//! - [`ResultStore`] - Materialized results, paging and the aggregated-range cache
//! - [`SessionRegistry`] - Session markers and the expiry sweep
//! - [`keys`] - The key namespace shared by all of the above

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod base;
mod codec;
mod error;
pub mod keys;
mod redis_store;
mod results;
mod session;
mod store;

pub use base::{BaseCache, BaseSeries};
pub use codec::{decode_bars, encode_bars};
pub use error::{CacheError, HandleError, ResolveError, ResultError, SessionError};
pub use redis_store::RedisStore;
pub use results::{InitialPage, Page, ResultHandle, ResultStore};
pub use session::{SessionRegistry, SweepReport};
pub use store::{CacheStore, MemoryStore};
