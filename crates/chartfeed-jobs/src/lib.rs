//! Background work for chartfeed.
//!
//! - [`FanoutPool`] - Worker pool deriving every standard interval from a served series
//! - [`SweepScheduler`] - Periodic session expiry sweep
//! - [`BarStore`] / [`FileBarStore`] - Durable bar storage with idempotent upserts
//! - [`run_history_job`] - Full-history aggregation tracked by an [`AggregationJob`]

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod history;
mod job;
mod pool;
mod store;
mod sweep;

pub use history::{DEFAULT_TARGETS, run_history_job};
pub use job::{AggregationJob, IntervalTask, JobId, JobStatus};
pub use pool::{FanoutJob, FanoutPool};
pub use store::{BarStore, FileBarStore, StoreError};
pub use sweep::SweepScheduler;
