//! In-memory object store for dry runs and tests.
//!
//! This provides an [`ObjectClient`] backed by a `HashMap`, removing the need for a remote store
//! when exercising the benchmark. The client is [`Clone`] so tests can hold a handle for direct
//! inspection while the benchmark owns a shared copy.
//!
//! With a non-zero stale rate the store behaves like an eventually consistent service: a read
//! may observe the value that was current before the most recent write.

use std::collections::{BTreeMap, HashMap, btree_map};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use rand::Rng;

use crate::common::{KeyStream, ObjectClient};
use crate::error::ClientResult;

#[derive(Debug)]
struct Entry {
    current: Bytes,
    previous: Option<Bytes>,
}

type Store = HashMap<String, BTreeMap<String, Entry>>;

/// An [`ObjectClient`] that keeps all objects in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryClient {
    store: Arc<Mutex<Store>>,
    stale_rate: f64,
}

impl InMemoryClient {
    /// Creates an empty, strongly consistent store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that serves the previous value of an object with the given
    /// probability. The rate is clamped to `0.0..=1.0`.
    pub fn with_stale_rate(stale_rate: f64) -> Self {
        let stale_rate = if stale_rate.is_nan() {
            0.0
        } else {
            stale_rate.clamp(0.0, 1.0)
        };

        Self {
            store: Default::default(),
            stale_rate,
        }
    }

    /// Returns the current contents of an object, bypassing any simulated staleness.
    pub fn get_stored(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let store = self.store.lock().unwrap();
        store.get(bucket)?.get(key).map(|entry| entry.current.clone())
    }

    /// Returns the number of objects in the given bucket.
    pub fn len(&self, bucket: &str) -> usize {
        let store = self.store.lock().unwrap();
        store.get(bucket).map_or(0, BTreeMap::len)
    }

    /// Returns `true` if the given bucket holds no objects.
    pub fn is_empty(&self, bucket: &str) -> bool {
        self.len(bucket) == 0
    }
}

#[async_trait::async_trait]
impl ObjectClient for InMemoryClient {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn list(&self, bucket: &str) -> KeyStream<'_> {
        let keys: Vec<_> = {
            let store = self.store.lock().unwrap();
            store
                .get(bucket)
                .map(|objects| objects.keys().cloned().map(Ok).collect())
                .unwrap_or_default()
        };
        stream::iter(keys).boxed()
    }

    async fn get(&self, bucket: &str, key: &str) -> ClientResult<Option<Bytes>> {
        let serve_stale = self.stale_rate > 0.0 && rand::rng().random_bool(self.stale_rate);

        let store = self.store.lock().unwrap();
        let Some(entry) = store.get(bucket).and_then(|objects| objects.get(key)) else {
            return Ok(None);
        };

        if serve_stale {
            Ok(entry.previous.clone())
        } else {
            Ok(Some(entry.current.clone()))
        }
    }

    async fn put(&self, bucket: &str, key: &str, value: Bytes) -> ClientResult<()> {
        let mut store = self.store.lock().unwrap();
        let objects = store.entry(bucket.to_owned()).or_default();

        match objects.entry(key.to_owned()) {
            btree_map::Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let previous = std::mem::replace(&mut entry.current, value);
                entry.previous = Some(previous);
            }
            btree_map::Entry::Vacant(vacant) => {
                vacant.insert(Entry {
                    current: value,
                    previous: None,
                });
            }
        }
        Ok(())
    }

    async fn delete_batch(&self, bucket: &str, keys: Vec<String>) -> ClientResult<()> {
        let mut store = self.store.lock().unwrap();
        if let Some(objects) = store.get_mut(bucket) {
            for key in &keys {
                objects.remove(key);
            }
        }
        Ok(())
    }
}
