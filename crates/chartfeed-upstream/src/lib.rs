//! Upstream market-data boundary for chartfeed.
//!
//! This crate owns everything that talks to the data vendor:
//!
//! - [`BarFeed`] - The fetch contract used by the cache layer
//! - [`Supervisor`] - Single owner of the live connection and its reconnect policy
//! - [`HttpConnector`] - Connector for an HTTP bar gateway
//! - [`MemoryFeed`] - Preloaded in-memory feed for offline replay and tests

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod feed;
mod http;
mod supervisor;

pub use feed::{BarFeed, FetchRequest, IntervalKind, MemoryFeed, Outage, UpstreamError};
pub use http::{ClientConfig, HttpConnection, HttpConnector};
pub use supervisor::{BackoffPolicy, Connection, Connector, Supervisor};
