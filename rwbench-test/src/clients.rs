//! Object clients with controlled behavior for exercising the benchmark.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use rwbench_client::{ClientError, ClientResult, InMemoryClient, KeyStream, ObjectClient};

/// A single call observed by a [`RecordingClient`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// A `get` for the given key was issued.
    GetStarted(String),
    /// A `get` for the given key returned.
    GetFinished(String),
    /// A `put` for the given key was issued.
    PutStarted(String),
    /// A `put` for the given key returned.
    PutFinished(String),
    /// A batch of the given size was deleted.
    DeletedBatch(usize),
}

/// Wraps an [`InMemoryClient`] and records the order of all calls.
///
/// Reads and writes sleep for a simulated latency. Read latencies cycle through one to four
/// times the base latency, so that concurrent reads complete out of launch order.
#[derive(Debug)]
pub struct RecordingClient {
    inner: InMemoryClient,
    read_latency: Duration,
    write_latency: Duration,
    reads: AtomicUsize,
    events: Mutex<Vec<Event>>,
}

impl RecordingClient {
    /// Creates a recording client on top of the given store.
    pub fn new(inner: InMemoryClient) -> Self {
        Self {
            inner,
            read_latency: Duration::ZERO,
            write_latency: Duration::ZERO,
            reads: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Sets the simulated base latencies for reads and writes.
    pub fn with_latency(mut self, read: Duration, write: Duration) -> Self {
        self.read_latency = read;
        self.write_latency = write;
        self
    }

    /// Returns a copy of all events recorded so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait::async_trait]
impl ObjectClient for RecordingClient {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn list(&self, bucket: &str) -> KeyStream<'_> {
        self.inner.list(bucket)
    }

    async fn get(&self, bucket: &str, key: &str) -> ClientResult<Option<Bytes>> {
        self.record(Event::GetStarted(key.to_owned()));
        let factor = 1 + (self.reads.fetch_add(1, Ordering::Relaxed) % 4) as u32;
        tokio::time::sleep(self.read_latency * factor).await;
        let value = self.inner.get(bucket, key).await;
        self.record(Event::GetFinished(key.to_owned()));
        value
    }

    async fn put(&self, bucket: &str, key: &str, value: Bytes) -> ClientResult<()> {
        self.record(Event::PutStarted(key.to_owned()));
        tokio::time::sleep(self.write_latency).await;
        self.inner.put(bucket, key, value).await?;
        self.record(Event::PutFinished(key.to_owned()));
        Ok(())
    }

    async fn delete_batch(&self, bucket: &str, keys: Vec<String>) -> ClientResult<()> {
        let len = keys.len();
        self.inner.delete_batch(bucket, keys).await?;
        self.record(Event::DeletedBatch(len));
        Ok(())
    }
}

/// A client whose reads always return the same payload and whose writes are discarded.
///
/// Use `None` to simulate an object that never becomes visible.
#[derive(Debug, Default)]
pub struct StaticClient {
    value: Option<Bytes>,
}

impl StaticClient {
    /// Creates a client whose reads return `value`.
    pub fn new(value: Option<Bytes>) -> Self {
        Self { value }
    }
}

#[async_trait::async_trait]
impl ObjectClient for StaticClient {
    fn name(&self) -> &'static str {
        "static"
    }

    fn list(&self, _bucket: &str) -> KeyStream<'_> {
        stream::empty().boxed()
    }

    async fn get(&self, _bucket: &str, _key: &str) -> ClientResult<Option<Bytes>> {
        Ok(self.value.clone())
    }

    async fn put(&self, _bucket: &str, _key: &str, _value: Bytes) -> ClientResult<()> {
        Ok(())
    }

    async fn delete_batch(&self, _bucket: &str, _keys: Vec<String>) -> ClientResult<()> {
        Ok(())
    }
}

/// Wraps an [`InMemoryClient`] and fails reads or writes after a number of successful calls.
#[derive(Debug)]
pub struct FailingClient {
    inner: InMemoryClient,
    gets_left: AtomicUsize,
    puts_left: AtomicUsize,
}

impl FailingClient {
    /// Creates a client that lets `gets` reads and `puts` writes succeed, then fails.
    pub fn new(inner: InMemoryClient, gets: usize, puts: usize) -> Self {
        Self {
            inner,
            gets_left: AtomicUsize::new(gets),
            puts_left: AtomicUsize::new(puts),
        }
    }

    fn take(budget: &AtomicUsize, operation: &str) -> ClientResult<()> {
        budget
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| left.checked_sub(1))
            .map(|_| ())
            .map_err(|_| ClientError::generic(format!("injected {operation} failure"), "boom"))
    }
}

#[async_trait::async_trait]
impl ObjectClient for FailingClient {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn list(&self, bucket: &str) -> KeyStream<'_> {
        self.inner.list(bucket)
    }

    async fn get(&self, bucket: &str, key: &str) -> ClientResult<Option<Bytes>> {
        Self::take(&self.gets_left, "get")?;
        self.inner.get(bucket, key).await
    }

    async fn put(&self, bucket: &str, key: &str, value: Bytes) -> ClientResult<()> {
        Self::take(&self.puts_left, "put")?;
        self.inner.put(bucket, key, value).await
    }

    async fn delete_batch(&self, bucket: &str, keys: Vec<String>) -> ClientResult<()> {
        self.inner.delete_batch(bucket, keys).await
    }
}
