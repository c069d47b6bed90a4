use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::error::ClientResult;

/// A type-erased [`ObjectClient`] shared between all workers of a run.
pub type SharedClient = Arc<dyn ObjectClient>;

/// A stream of object keys, yielded page by page as the store lists them.
pub type KeyStream<'a> = BoxStream<'a, ClientResult<String>>;

/// Access to a remote key/value object store.
///
/// Implementations must be safe for concurrent use; the benchmark issues calls from many tasks
/// at once through a shared reference.
#[async_trait::async_trait]
pub trait ObjectClient: Debug + Send + Sync + 'static {
    /// The client name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Lists all object keys in the given bucket.
    fn list(&self, bucket: &str) -> KeyStream<'_>;

    /// Retrieves the contents of an object, or `None` if the object does not exist.
    async fn get(&self, bucket: &str, key: &str) -> ClientResult<Option<Bytes>>;

    /// Stores or overwrites an object.
    async fn put(&self, bucket: &str, key: &str, value: Bytes) -> ClientResult<()>;

    /// Deletes all given objects. Keys that do not exist are ignored.
    async fn delete_batch(&self, bucket: &str, keys: Vec<String>) -> ClientResult<()>;
}
