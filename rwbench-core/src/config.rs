//! Parameters of a single benchmark run.

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::worker::KEY_ALPHABET;

/// Immutable parameters of a benchmark run, shared by all workers.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// The bucket all workers read from and write to.
    pub bucket: String,

    /// Whether to delete all objects in the bucket before the run starts.
    pub clear: bool,

    /// Number of concurrent workers.
    pub concurrency: usize,

    /// Number of operations each worker performs.
    pub iterations: usize,

    /// Target ratio of reads to writes per worker.
    ///
    /// `0` disables reads, so every operation is a write.
    pub rwratio: f64,

    /// Length of the randomly generated object key of each worker.
    pub key_length: usize,

    /// Length of the randomly generated value of each write.
    pub value_length: usize,

    /// Seed for all random keys and values. A random seed is drawn when unset.
    pub seed: Option<u64>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            clear: false,
            concurrency: 1,
            iterations: 100,
            rwratio: 1.0,
            key_length: 8,
            value_length: 64,
            seed: None,
        }
    }
}

impl BenchmarkConfig {
    /// Creates a configuration with defaults for the given bucket.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    /// Checks that the configuration describes a run that can be executed.
    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(invalid("bucket must not be empty"));
        }
        if self.concurrency == 0 {
            return Err(invalid("concurrency must be at least 1"));
        }
        if self.iterations == 0 {
            return Err(invalid("iterations must be at least 1"));
        }
        if !self.rwratio.is_finite() || self.rwratio < 0.0 {
            return Err(invalid(format!(
                "rwratio must be a non-negative number, got {}",
                self.rwratio
            )));
        }
        if self.value_length == 0 {
            return Err(invalid("value_length must be at least 1"));
        }
        if self.key_length == 0 {
            return Err(invalid("key_length must be at least 1"));
        }

        // Every worker needs its own key.
        let distinct_keys = u32::try_from(self.key_length)
            .ok()
            .and_then(|len| (KEY_ALPHABET.len() as u64).checked_pow(len))
            .unwrap_or(u64::MAX);
        if distinct_keys < self.concurrency as u64 {
            return Err(invalid(format!(
                "key_length {} cannot produce {} distinct keys",
                self.key_length, self.concurrency
            )));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> BenchError {
    BenchError::InvalidConfig(message.into())
}
