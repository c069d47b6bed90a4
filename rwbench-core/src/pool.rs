//! Spawns the workers of a run and aggregates their results.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rwbench_client::SharedClient;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::clear::clear_bucket;
use crate::config::BenchmarkConfig;
use crate::error::Result;
use crate::stats::MergedStats;
use crate::worker::{Worker, random_key};

/// The result of a completed run.
#[derive(Debug)]
pub struct RunOutcome {
    /// Statistics merged over all workers.
    pub stats: MergedStats,
    /// Wall-clock time from spawning the first worker until the last one finished.
    pub elapsed: Duration,
    /// Number of objects deleted before the run, if the bucket was cleared.
    pub cleared: Option<usize>,
}

/// Runs a fixed number of workers against a shared client.
#[derive(Debug)]
pub struct WorkerPool {
    config: Arc<BenchmarkConfig>,
    client: SharedClient,
}

impl WorkerPool {
    /// Creates a pool after validating the configuration.
    pub fn new(config: BenchmarkConfig, client: SharedClient) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }

    /// The configuration shared by all workers.
    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Runs all workers to completion and merges their statistics.
    ///
    /// If the configuration asks for it, the bucket is cleared first. The first failing worker
    /// aborts the entire run; no partial statistics are returned.
    pub async fn run(&self) -> Result<RunOutcome> {
        let config = &self.config;

        let cleared = if config.clear {
            Some(clear_bucket(&self.client, &config.bucket).await?)
        } else {
            None
        };

        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = SmallRng::seed_from_u64(seed);
        let keys = worker_keys(&mut rng, config.concurrency, config.key_length);

        tracing::info!(
            concurrency = config.concurrency,
            iterations = config.iterations,
            rwratio = config.rwratio,
            seed,
            client = self.client.name(),
            "Pool started"
        );
        let start = Instant::now();

        let mut workers = JoinSet::new();
        for (id, key) in keys.into_iter().enumerate() {
            let worker = Worker::new(
                id,
                key,
                Arc::clone(config),
                Arc::clone(&self.client),
                SmallRng::from_rng(&mut rng),
            );
            workers.spawn(worker.run());
        }

        // Returning early drops the set, which cancels all remaining workers.
        let mut stats = Vec::with_capacity(config.concurrency);
        while let Some(result) = workers.join_next().await {
            match result? {
                Ok(worker_stats) => stats.push(worker_stats),
                Err(error) => {
                    tracing::error!(
                        error = &error as &dyn std::error::Error,
                        "Worker failed, aborting run"
                    );
                    return Err(error);
                }
            }
        }

        let elapsed = start.elapsed();
        tracing::info!(?elapsed, "Pool stopped");

        Ok(RunOutcome {
            stats: MergedStats::merge(stats.iter().map(Arc::as_ref)),
            elapsed,
            cleared,
        })
    }
}

/// Validates `config`, then runs a [`WorkerPool`] to completion.
pub async fn run(config: BenchmarkConfig, client: SharedClient) -> Result<RunOutcome> {
    WorkerPool::new(config, client)?.run().await
}

/// Draws `count` pairwise distinct keys of length `len`.
///
/// The caller must ensure that enough distinct keys exist, see
/// [`BenchmarkConfig::validate`].
fn worker_keys(rng: &mut SmallRng, count: usize, len: usize) -> Vec<String> {
    let mut seen = HashSet::with_capacity(count);
    let mut keys = Vec::with_capacity(count);

    while keys.len() < count {
        let key = random_key(rng, len);
        if seen.insert(key.clone()) {
            keys.push(key);
        }
    }

    keys
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures_util::TryStreamExt;
    use rwbench_client::{InMemoryClient, ObjectClient};
    use rwbench_test::clients::{Event, FailingClient, RecordingClient};

    use super::*;
    use crate::error::BenchError;
    use crate::report::report;
    use crate::stats::StatsSnapshot;

    fn config(concurrency: usize, iterations: usize, rwratio: f64) -> BenchmarkConfig {
        BenchmarkConfig {
            concurrency,
            iterations,
            rwratio,
            ..BenchmarkConfig::new("bench")
        }
    }

    #[tokio::test]
    async fn single_write_run() {
        let outcome = run(config(1, 1, 1.0), Arc::new(InMemoryClient::new()))
            .await
            .unwrap();

        assert_eq!(
            outcome.stats.snapshot(),
            StatsSnapshot {
                writes: 1,
                ..Default::default()
            }
        );
        assert_eq!(outcome.cleared, None);

        let report = report(&outcome.stats);
        assert!(report.contains("Writes:       1\n"), "{report}");
        assert!(report.contains("Latest reads: 0/0\n"), "{report}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn runs_all_workers_on_distinct_keys() {
        rwbench_test::tracing::init();

        let store = InMemoryClient::new();
        let outcome = run(config(8, 100, 1.0), Arc::new(store.clone()))
            .await
            .unwrap();

        let stats = &outcome.stats;
        assert_eq!(stats.reads, 8 * 50);
        assert_eq!(stats.writes, 8 * 50);
        assert_eq!(stats.latest_reads, stats.reads);
        assert_eq!(stats.read_latency.count(), 400);
        assert_eq!(stats.write_latency.count(), 400);

        assert_eq!(store.len("bench"), 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn clears_bucket_before_workers_start() {
        let store = InMemoryClient::new();
        for i in 0..600 {
            let key = format!("leftover-{i}");
            store.put("bench", &key, Bytes::from_static(b"old")).await.unwrap();
        }

        let recorder = Arc::new(RecordingClient::new(store.clone()));
        let config = BenchmarkConfig {
            clear: true,
            ..config(4, 20, 1.0)
        };
        let outcome = run(config, recorder.clone()).await.unwrap();
        assert_eq!(outcome.cleared, Some(600));

        let events = recorder.events();
        let first_put = events
            .iter()
            .position(|event| matches!(event, Event::PutStarted(_)))
            .unwrap();
        let mut batches: Vec<_> = events[..first_put]
            .iter()
            .map(|event| match event {
                Event::DeletedBatch(size) => *size,
                other => panic!("unexpected {other:?} before the first write"),
            })
            .collect();
        batches.sort_unstable();
        assert_eq!(batches, [88, 256, 256]);
        assert!(
            !events[first_put..]
                .iter()
                .any(|event| matches!(event, Event::DeletedBatch(_)))
        );

        let remaining: Vec<String> = store.list("bench").try_collect().await.unwrap();
        assert_eq!(remaining.len(), 4);
        assert!(remaining.iter().all(|key| !key.starts_with("leftover-")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failing_worker_aborts_run() {
        let client = FailingClient::new(InMemoryClient::new(), usize::MAX, 5);
        let result = run(config(4, 100, 1.0), Arc::new(client)).await;

        assert!(matches!(result, Err(BenchError::Client(_))));
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let result = WorkerPool::new(config(0, 10, 1.0), Arc::new(InMemoryClient::new()));
        assert!(matches!(result, Err(BenchError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn seeded_runs_are_reproducible() {
        let mut listings = Vec::new();
        for _ in 0..2 {
            let store = InMemoryClient::new();
            let config = BenchmarkConfig {
                seed: Some(7),
                ..config(3, 10, 1.0)
            };
            run(config, Arc::new(store.clone())).await.unwrap();

            let keys: Vec<String> = store.list("bench").try_collect().await.unwrap();
            let values: Vec<_> = keys
                .iter()
                .map(|key| store.get_stored("bench", key).unwrap())
                .collect();
            listings.push((keys, values));
        }

        assert_eq!(listings[0], listings[1]);
    }

    #[test]
    fn exhausts_small_key_space() {
        let mut rng = SmallRng::seed_from_u64(1);
        let keys = worker_keys(&mut rng, 36, 1);

        let distinct: HashSet<_> = keys.iter().collect();
        assert_eq!(distinct.len(), 36);
    }
}
