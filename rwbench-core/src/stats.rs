//! Per-worker runtime statistics and their aggregation across workers.
//!
//! Every worker owns one [`RuntimeStats`], which is updated by the worker loop and by the read
//! tasks it spawns. Once all workers are done, [`MergedStats::merge`] folds them into a single
//! summary with latency percentiles.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sketches_ddsketch::DDSketch;

/// Quantiles included in every latency summary.
pub const QUANTILES: [f64; 3] = [0.5, 0.9, 0.99];

/// Counters and latency samples of a single worker.
///
/// Counters are atomics, so the worker loop can read them without locking. A read updates its
/// latency sample and its counters within one critical section of the sample lock, which keeps
/// [`snapshot`](Self::snapshot) consistent: `latest_reads + stale_reads == reads` always holds.
#[derive(Debug, Default)]
pub struct RuntimeStats {
    reads: AtomicU64,
    writes: AtomicU64,
    latest_reads: AtomicU64,
    stale_reads: AtomicU64,
    timings: Mutex<Timings>,
}

#[derive(Debug, Default)]
struct Timings {
    reads: Vec<Duration>,
    writes: Vec<Duration>,
}

/// A point-in-time copy of the counters of a [`RuntimeStats`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatsSnapshot {
    /// Number of completed reads.
    pub reads: u64,
    /// Number of completed writes.
    pub writes: u64,
    /// Reads that returned the value of the most recent write.
    pub latest_reads: u64,
    /// Reads that returned anything else, including no object at all.
    pub stale_reads: u64,
}

impl RuntimeStats {
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed read and whether it observed the latest written value.
    pub fn record_read(&self, latency: Duration, latest: bool) {
        let mut timings = self.timings.lock().unwrap();
        timings.reads.push(latency);

        let outcome = if latest {
            &self.latest_reads
        } else {
            &self.stale_reads
        };
        outcome.fetch_add(1, Ordering::Relaxed);
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a completed write.
    pub fn record_write(&self, latency: Duration) {
        let mut timings = self.timings.lock().unwrap();
        timings.writes.push(latency);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of completed reads.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of completed writes.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns a consistent copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let _timings = self.timings.lock().unwrap();
        StatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            latest_reads: self.latest_reads.load(Ordering::Relaxed),
            stale_reads: self.stale_reads.load(Ordering::Relaxed),
        }
    }
}

/// A latency distribution with percentile estimates.
///
/// Percentiles come from a [`DDSketch`], while count, mean, minimum and maximum are exact.
#[derive(Clone, Default)]
pub struct LatencySummary {
    sketch: DDSketch,
    total: Duration,
    min: Option<Duration>,
    max: Option<Duration>,
}

impl LatencySummary {
    /// Adds a single sample.
    pub fn add(&mut self, latency: Duration) {
        self.sketch.add(latency.as_secs_f64());
        self.total += latency;
        self.min = Some(self.min.map_or(latency, |min| min.min(latency)));
        self.max = Some(self.max.map_or(latency, |max| max.max(latency)));
    }

    /// Number of samples.
    pub fn count(&self) -> usize {
        self.sketch.count()
    }

    /// The arithmetic mean of all samples.
    pub fn mean(&self) -> Option<Duration> {
        let count = self.count() as u128;
        if count == 0 {
            return None;
        }
        let nanos = self.total.as_nanos() / count;
        Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }

    /// The smallest sample.
    pub fn min(&self) -> Option<Duration> {
        self.min
    }

    /// The largest sample.
    pub fn max(&self) -> Option<Duration> {
        self.max
    }

    /// The estimated latency at quantile `q` in `0.0..=1.0`.
    pub fn quantile(&self, q: f64) -> Option<Duration> {
        let seconds = self.sketch.quantile(q).ok().flatten()?;
        Duration::try_from_secs_f64(seconds.max(0.0)).ok()
    }
}

impl fmt::Debug for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatencySummary")
            .field("count", &self.count())
            .field("mean", &self.mean())
            .field("min", &self.min)
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

/// Counters and latency summaries aggregated over all workers of a run.
#[derive(Clone, Debug, Default)]
pub struct MergedStats {
    /// Total number of reads.
    pub reads: u64,
    /// Total number of writes.
    pub writes: u64,
    /// Total number of reads that observed the latest value.
    pub latest_reads: u64,
    /// Total number of reads that observed a stale value.
    pub stale_reads: u64,
    /// Latencies of all reads.
    pub read_latency: LatencySummary,
    /// Latencies of all writes.
    pub write_latency: LatencySummary,
}

impl MergedStats {
    /// Folds the statistics of all workers into one summary.
    ///
    /// The inputs are left untouched, and their order does not affect the result.
    pub fn merge<'a, I>(stats: I) -> Self
    where
        I: IntoIterator<Item = &'a RuntimeStats>,
    {
        let mut merged = Self::default();

        for worker in stats {
            let timings = worker.timings.lock().unwrap();
            merged.reads += worker.reads.load(Ordering::Relaxed);
            merged.writes += worker.writes.load(Ordering::Relaxed);
            merged.latest_reads += worker.latest_reads.load(Ordering::Relaxed);
            merged.stale_reads += worker.stale_reads.load(Ordering::Relaxed);

            for latency in &timings.reads {
                merged.read_latency.add(*latency);
            }
            for latency in &timings.writes {
                merged.write_latency.add(*latency);
            }
        }

        merged
    }

    /// The counters of the merged statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads,
            writes: self.writes,
            latest_reads: self.latest_reads,
            stale_reads: self.stale_reads,
        }
    }
}
