//! Human-readable rendering of [`MergedStats`].

use std::fmt;
use std::time::Duration;

use crate::stats::{LatencySummary, MergedStats};

/// Renders the consistency ratios and latency summaries of a run.
pub fn report(stats: &MergedStats) -> String {
    Report::new(stats).to_string()
}

/// A printable report over merged statistics.
///
/// Optionally includes throughput when the duration of the run is known.
#[derive(Debug)]
pub struct Report<'a> {
    stats: &'a MergedStats,
    elapsed: Option<Duration>,
}

impl<'a> Report<'a> {
    /// Creates a report without throughput.
    pub fn new(stats: &'a MergedStats) -> Self {
        Self {
            stats,
            elapsed: None,
        }
    }

    /// Adds operations per second, computed over the given run duration.
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats;

        write!(f, "Latest reads: {}/{}", stats.latest_reads, stats.reads)?;
        write_share(f, stats.latest_reads, stats.reads)?;
        write!(f, "Stale reads:  {}/{}", stats.stale_reads, stats.reads)?;
        write_share(f, stats.stale_reads, stats.reads)?;
        writeln!(f, "Writes:       {}", stats.writes)?;

        if let Some(elapsed) = self.elapsed {
            let seconds = elapsed.as_secs_f64();
            if seconds > 0.0 {
                writeln!(
                    f,
                    "Throughput:   {:.2} reads/s, {:.2} writes/s over {elapsed:.2?}",
                    stats.reads as f64 / seconds,
                    stats.writes as f64 / seconds,
                )?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Read timings:")?;
        write_latency(f, &stats.read_latency)?;
        writeln!(f)?;
        writeln!(f, "Write timings:")?;
        write_latency(f, &stats.write_latency)
    }
}

fn write_share(f: &mut fmt::Formatter<'_>, part: u64, total: u64) -> fmt::Result {
    if total == 0 {
        return writeln!(f);
    }
    writeln!(f, " ({:.2}%)", part as f64 * 100.0 / total as f64)
}

fn write_latency(f: &mut fmt::Formatter<'_>, summary: &LatencySummary) -> fmt::Result {
    let (Some(avg), Some(min), Some(max)) = (summary.mean(), summary.min(), summary.max()) else {
        return writeln!(f, "  no samples");
    };

    let quantile = |q| summary.quantile(q).unwrap_or_default();
    writeln!(
        f,
        "  count: {}; avg: {avg:.2?}; min: {min:.2?}; p50: {:.2?}; p90: {:.2?}; p99: {:.2?}; max: {max:.2?}",
        summary.count(),
        quantile(0.5),
        quantile(0.9),
        quantile(0.99),
    )
}
