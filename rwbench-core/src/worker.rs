//! A single benchmark worker and its operation scheduling.
//!
//! A worker owns one object for its whole lifetime. In every iteration it picks an
//! [`Operation`] with [`choose_operation`] and executes it:
//!
//! - Reads are spawned as concurrent tasks and do not block the loop. Each read compares the
//!   returned bytes with the value the worker last wrote *at the time the read was launched*.
//! - Writes first wait for every outstanding read, then store a fresh random value.
//!
//! When the loop ends, the worker drains all remaining reads before handing back its
//! statistics, so no read can complete after the pool starts aggregating.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;
use rand::distr::Alphanumeric;
use rand::rngs::SmallRng;
use rwbench_client::SharedClient;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::BenchmarkConfig;
use crate::error::Result;
use crate::stats::RuntimeStats;

/// Characters used for object keys.
pub const KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// The operation a worker performs in one iteration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    /// Read the worker's object and check whether it holds the latest value.
    Read,
    /// Overwrite the worker's object with a new value.
    Write,
}

/// Picks the next operation from the counts of reads and writes issued so far.
///
/// The very first operation is always a write, so that reads have something to observe. After
/// that, a write is chosen whenever the observed read/write ratio exceeds the target, and a read
/// otherwise. A target of `0` never reads.
pub fn choose_operation(reads: u64, writes: u64, rwratio: f64) -> Operation {
    if writes == 0 || rwratio <= 0.0 {
        return Operation::Write;
    }

    let observed = reads as f64 / writes as f64;
    if observed > rwratio {
        Operation::Write
    } else {
        Operation::Read
    }
}

/// Generates a random object key from [`KEY_ALPHABET`].
pub fn random_key(rng: &mut impl Rng, len: usize) -> String {
    (0..len)
        .map(|_| char::from(KEY_ALPHABET[rng.random_range(0..KEY_ALPHABET.len())]))
        .collect()
}

/// Generates a random alphanumeric value.
pub fn random_value(rng: &mut impl Rng, len: usize) -> Bytes {
    let value: Vec<u8> = rng.sample_iter(Alphanumeric).take(len).collect();
    Bytes::from(value)
}

/// State exclusively owned by one worker for the duration of its run.
#[derive(Debug)]
pub struct WorkerState {
    /// The key of the worker's object.
    pub key: Arc<str>,
    /// The value of the worker's most recent write.
    pub current_value: Bytes,
    /// Statistics shared with the worker's read tasks.
    pub stats: Arc<RuntimeStats>,
}

impl WorkerState {
    /// Creates the state for a worker operating on `key`.
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self {
            key: key.into(),
            current_value: Bytes::new(),
            stats: Arc::new(RuntimeStats::new()),
        }
    }
}

/// Repeatedly reads and writes a single object.
#[derive(Debug)]
pub struct Worker {
    id: usize,
    config: Arc<BenchmarkConfig>,
    client: SharedClient,
    rng: SmallRng,
    state: WorkerState,
}

impl Worker {
    /// Creates a worker that operates on `key`.
    pub fn new(
        id: usize,
        key: impl Into<Arc<str>>,
        config: Arc<BenchmarkConfig>,
        client: SharedClient,
        rng: SmallRng,
    ) -> Self {
        Self {
            id,
            config,
            client,
            rng,
            state: WorkerState::new(key),
        }
    }

    /// Runs all iterations and returns the worker's statistics.
    ///
    /// The first failing read or write aborts the worker. Reads still in flight at that point
    /// are cancelled.
    pub async fn run(mut self) -> Result<Arc<RuntimeStats>> {
        tracing::debug!(worker = self.id, key = %self.state.key, "Worker started");

        let mut pending_reads = JoinSet::new();
        let mut launched_reads = 0;

        for _ in 0..self.config.iterations {
            reap_reads(&mut pending_reads)?;

            let writes = self.state.stats.writes();
            match choose_operation(launched_reads, writes, self.config.rwratio) {
                Operation::Read => {
                    launched_reads += 1;
                    pending_reads.spawn(self.read());
                }
                Operation::Write => {
                    drain_reads(&mut pending_reads).await?;
                    self.write().await?;
                }
            }
        }

        tracing::trace!(
            worker = self.id,
            pending = pending_reads.len(),
            "Draining reads"
        );
        drain_reads(&mut pending_reads).await?;

        tracing::debug!(worker = self.id, "Worker done");
        Ok(self.state.stats)
    }

    /// Creates a read task that classifies its result against the current value.
    fn read(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let config = Arc::clone(&self.config);
        let client = Arc::clone(&self.client);
        let key = Arc::clone(&self.state.key);
        let expected = self.state.current_value.clone();
        let stats = Arc::clone(&self.state.stats);

        async move {
            let start = Instant::now();
            let value = client.get(&config.bucket, &key).await?;
            let latest = value.as_deref() == Some(expected.as_ref());
            stats.record_read(start.elapsed(), latest);
            Ok(())
        }
    }

    async fn write(&mut self) -> Result<()> {
        let value = random_value(&mut self.rng, self.config.value_length);
        self.state.current_value = value.clone();

        let start = Instant::now();
        self.client
            .put(&self.config.bucket, &self.state.key, value)
            .await?;
        self.state.stats.record_write(start.elapsed());
        Ok(())
    }
}

/// Collects reads that already finished, surfacing the first failure.
fn reap_reads(reads: &mut JoinSet<Result<()>>) -> Result<()> {
    while let Some(result) = reads.try_join_next() {
        result??;
    }
    Ok(())
}

/// Waits until all outstanding reads have finished, leaving the set empty.
async fn drain_reads(reads: &mut JoinSet<Result<()>>) -> Result<()> {
    while let Some(result) = reads.join_next().await {
        result??;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use proptest::prelude::*;
    use rand::SeedableRng;
    use rwbench_client::{ClientError, InMemoryClient};
    use rwbench_test::clients::{Event, FailingClient, RecordingClient, StaticClient};

    use super::*;
    use crate::error::BenchError;
    use crate::stats::StatsSnapshot;

    fn config(iterations: usize, rwratio: f64) -> Arc<BenchmarkConfig> {
        Arc::new(BenchmarkConfig {
            iterations,
            rwratio,
            ..BenchmarkConfig::new("bench")
        })
    }

    fn worker(config: Arc<BenchmarkConfig>, client: SharedClient) -> Worker {
        Worker::new(0, "testkey0", config, client, SmallRng::seed_from_u64(0))
    }

    /// Runs the scheduler alone, returning `(reads, writes)`.
    fn simulate(iterations: usize, rwratio: f64) -> (u64, u64) {
        let (mut reads, mut writes) = (0, 0);
        for _ in 0..iterations {
            match choose_operation(reads, writes, rwratio) {
                Operation::Read => reads += 1,
                Operation::Write => writes += 1,
            }
        }
        (reads, writes)
    }

    #[test]
    fn first_operation_is_write() {
        for rwratio in [0.0, 0.5, 1.0, 2.0, 10.0, 1e9] {
            assert_eq!(choose_operation(0, 0, rwratio), Operation::Write);
        }
    }

    #[test]
    fn writes_when_reads_get_ahead() {
        assert_eq!(choose_operation(0, 1, 1.0), Operation::Read);
        assert_eq!(choose_operation(1, 1, 1.0), Operation::Read);
        assert_eq!(choose_operation(2, 1, 1.0), Operation::Write);
        assert_eq!(choose_operation(5, 2, 2.0), Operation::Write);
        assert_eq!(choose_operation(4, 2, 2.0), Operation::Read);
    }

    #[test]
    fn zero_ratio_only_writes() {
        assert_eq!(simulate(5, 0.0), (0, 5));
        assert_eq!(choose_operation(0, 7, 0.0), Operation::Write);
    }

    #[test]
    fn ratio_error_shrinks_with_iterations() {
        for rwratio in [0.0, 0.5, 1.0, 2.0, 10.0] {
            let mut previous_error = f64::INFINITY;
            for iterations in [100, 1_000, 10_000] {
                let (reads, writes) = simulate(iterations, rwratio);
                let error = (reads as f64 / writes as f64 - rwratio).abs();
                // Ties with the bound are exact in theory but not in floating point.
                assert!(
                    error <= rwratio.max(1.0) / writes as f64 + 1e-9,
                    "ratio {rwratio}, {iterations} iterations: {reads}/{writes}"
                );
                assert!(error <= previous_error + 1e-9);
                previous_error = error;
            }
        }
    }

    #[test]
    fn half_ratio_ties_with_bound() {
        let (reads, writes) = simulate(1_000, 0.5);
        assert_eq!((reads, writes), (334, 666));

        let error = (reads as f64 / writes as f64 - 0.5).abs();
        assert!(error <= 1.0 / writes as f64 + 1e-9);
    }

    proptest! {
        #[test]
        fn realized_ratio_stays_within_bound(rwratio in 0.0f64..20.0, iterations in 1usize..5_000) {
            let (reads, writes) = simulate(iterations, rwratio);
            prop_assert_eq!((reads + writes) as usize, iterations);
            prop_assert!(writes >= 1);

            let error = (reads as f64 / writes as f64 - rwratio).abs();
            prop_assert!(error <= rwratio.max(1.0) / writes as f64 + 1e-9);
        }
    }

    #[test]
    fn generates_keys_and_values() {
        let mut rng = SmallRng::seed_from_u64(42);

        let key = random_key(&mut rng, 8);
        assert_eq!(key.len(), 8);
        assert!(key.bytes().all(|b| KEY_ALPHABET.contains(&b)));

        let value = random_value(&mut rng, 64);
        assert_eq!(value.len(), 64);
        assert!(value.iter().all(u8::is_ascii_alphanumeric));
        assert_ne!(random_value(&mut rng, 64), value);
    }

    #[tokio::test]
    async fn single_iteration_only_writes() {
        let store = InMemoryClient::new();
        let stats = worker(config(1, 1.0), Arc::new(store.clone()))
            .run()
            .await
            .unwrap();

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                writes: 1,
                ..Default::default()
            }
        );
        let stored = store.get_stored("bench", "testkey0").unwrap();
        assert_eq!(stored.len(), 64);
    }

    #[tokio::test]
    async fn zero_ratio_worker_only_writes() {
        let stats = worker(config(5, 0.0), Arc::new(InMemoryClient::new()))
            .run()
            .await
            .unwrap();

        assert_eq!(stats.snapshot().writes, 5);
        assert_eq!(stats.snapshot().reads, 0);
    }

    #[tokio::test]
    async fn follows_scheduler_exactly() {
        for rwratio in [0.5, 1.0, 2.0, 10.0] {
            let stats = worker(config(300, rwratio), Arc::new(InMemoryClient::new()))
                .run()
                .await
                .unwrap();

            let (reads, writes) = simulate(300, rwratio);
            let snapshot = stats.snapshot();
            assert_eq!((snapshot.reads, snapshot.writes), (reads, writes));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn consistent_store_only_serves_latest_reads() {
        let stats = worker(config(500, 3.0), Arc::new(InMemoryClient::new()))
            .run()
            .await
            .unwrap();

        let snapshot = stats.snapshot();
        assert!(snapshot.reads > 0);
        assert_eq!(snapshot.latest_reads, snapshot.reads);
        assert_eq!(snapshot.stale_reads, 0);
    }

    #[tokio::test]
    async fn mismatching_reads_are_stale() {
        for value in [Some(Bytes::from_static(b"someone else's value")), Some(Bytes::new()), None] {
            let client = StaticClient::new(value);
            let stats = worker(config(20, 1.0), Arc::new(client))
                .run()
                .await
                .unwrap();

            let snapshot = stats.snapshot();
            assert_eq!(snapshot.reads, 10);
            assert_eq!(snapshot.stale_reads, 10);
            assert_eq!(snapshot.latest_reads, 0);
        }
    }

    #[tokio::test]
    async fn lagging_store_produces_stale_reads() {
        let stats = worker(config(100, 1.0), Arc::new(InMemoryClient::with_stale_rate(1.0)))
            .run()
            .await
            .unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.reads, 50);
        assert_eq!(snapshot.stale_reads, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_wait_for_outstanding_reads() {
        let client = Arc::new(
            RecordingClient::new(InMemoryClient::new())
                .with_latency(Duration::from_millis(10), Duration::from_millis(5)),
        );
        let stats = worker(config(200, 4.0), client.clone())
            .run()
            .await
            .unwrap();

        let mut outstanding = 0;
        let mut max_outstanding = 0;
        for event in client.events() {
            match event {
                Event::GetStarted(_) => outstanding += 1,
                Event::GetFinished(_) => outstanding -= 1,
                Event::PutStarted(_) => assert_eq!(outstanding, 0, "write overlapped a read"),
                Event::PutFinished(_) => assert_eq!(outstanding, 0),
                Event::DeletedBatch(_) => unreachable!(),
            }
            max_outstanding = max_outstanding.max(outstanding);
        }

        // The final drain leaves nothing in flight, and reads did run concurrently.
        assert_eq!(outstanding, 0);
        assert_eq!(max_outstanding, 5);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.latest_reads, snapshot.reads);
        assert_eq!(snapshot.reads + snapshot.writes, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn records_simulated_latency() {
        let client = RecordingClient::new(InMemoryClient::new())
            .with_latency(Duration::from_millis(10), Duration::from_millis(5));
        let stats = worker(config(10, 1.0), Arc::new(client))
            .run()
            .await
            .unwrap();

        let merged = crate::stats::MergedStats::merge([stats.as_ref()]);
        let within = |latency: Option<Duration>, millis: u64| {
            let latency = latency.unwrap();
            latency >= Duration::from_millis(millis) && latency < Duration::from_millis(millis + 2)
        };
        assert!(within(merged.write_latency.min(), 5));
        assert!(within(merged.read_latency.min(), 10));
        assert!(within(merged.read_latency.max(), 40));
    }

    #[tokio::test]
    async fn failing_read_aborts_worker() {
        let client = FailingClient::new(InMemoryClient::new(), 2, usize::MAX);
        let result = worker(config(100, 1.0), Arc::new(client)).run().await;

        assert!(matches!(
            result,
            Err(BenchError::Client(ClientError::Generic { .. }))
        ));
    }

    #[tokio::test]
    async fn failing_write_aborts_worker() {
        let client = FailingClient::new(InMemoryClient::new(), usize::MAX, 3);
        let result = worker(config(100, 1.0), Arc::new(client)).run().await;

        let Err(BenchError::Client(error)) = result else {
            panic!("expected a client error");
        };
        assert!(error.to_string().contains("injected put failure"));
    }

    #[tokio::test]
    async fn keys_are_per_worker() {
        let store = InMemoryClient::new();
        let client: SharedClient = Arc::new(store.clone());
        let config = config(4, 1.0);

        let mut values = HashMap::new();
        for (id, key) in ["aaaa", "bbbb"].into_iter().enumerate() {
            let rng = SmallRng::seed_from_u64(id as u64);
            Worker::new(id, key, config.clone(), client.clone(), rng)
                .run()
                .await
                .unwrap();
            values.insert(key, store.get_stored("bench", key).unwrap());
        }

        assert_eq!(store.len("bench"), 2);
        assert_ne!(values["aaaa"], values["bbbb"]);
    }
}
