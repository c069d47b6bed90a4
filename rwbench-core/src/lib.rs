//! The concurrency engine of a read-after-write consistency benchmark for object stores.
//!
//! A [`WorkerPool`] drives a configurable number of workers. Each worker owns a single object and
//! repeatedly chooses between overwriting it and reading it back, steering the mix towards the
//! configured read/write ratio. Reads run as concurrent tasks; writes are sequential and wait for
//! all outstanding reads first. Every read is classified as *latest* if it returned the value of
//! the worker's most recent write, or *stale* otherwise.
//!
//! After all workers finish, their [`RuntimeStats`] are merged into [`MergedStats`], which the
//! [`report`] module renders as text.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod clear;
pub mod config;
pub mod error;
pub mod pool;
pub mod report;
pub mod stats;
pub mod worker;

pub use crate::config::BenchmarkConfig;
pub use crate::error::{BenchError, Result};
pub use crate::pool::{RunOutcome, WorkerPool, run};
pub use crate::stats::{LatencySummary, MergedStats, RuntimeStats, StatsSnapshot};
