//! Errors of a benchmark run.

use rwbench_client::ClientError;
use thiserror::Error;
use tokio::task::JoinError;

/// Errors that abort a benchmark run.
#[derive(Debug, Error)]
pub enum BenchError {
    /// A call to the object store failed.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// A worker or read task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(#[from] JoinError),

    /// The benchmark configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for benchmark operations.
pub type Result<T, E = BenchError> = std::result::Result<T, E>;
