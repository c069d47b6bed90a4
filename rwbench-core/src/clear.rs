//! Deletes all objects of a bucket before a run.

use std::sync::Arc;

use futures_util::StreamExt;
use rwbench_client::SharedClient;
use tokio::task::JoinSet;

use crate::error::Result;

/// Number of keys deleted per batch.
pub const DELETE_BATCH_SIZE: usize = 256;

/// Deletes every object in `bucket` and returns how many objects were deleted.
///
/// Keys are listed as a stream and grouped into batches of [`DELETE_BATCH_SIZE`]. Every batch is
/// deleted by its own task as soon as it is full, and the function only returns once all batches
/// have completed.
pub async fn clear_bucket(client: &SharedClient, bucket: &str) -> Result<usize> {
    tracing::info!(bucket, client = client.name(), "Clearing bucket");

    let mut keys = client.list(bucket);
    let mut batches = JoinSet::new();
    let mut batch = Vec::with_capacity(DELETE_BATCH_SIZE);

    while let Some(key) = keys.next().await {
        batch.push(key?);
        if batch.len() == DELETE_BATCH_SIZE {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(DELETE_BATCH_SIZE));
            spawn_delete(&mut batches, client, bucket, full);
        }
    }
    if !batch.is_empty() {
        spawn_delete(&mut batches, client, bucket, batch);
    }

    let mut deleted = 0;
    while let Some(result) = batches.join_next().await {
        deleted += result??;
    }

    tracing::info!(bucket, deleted, "Bucket cleared");
    Ok(deleted)
}

fn spawn_delete(
    batches: &mut JoinSet<Result<usize>>,
    client: &SharedClient,
    bucket: &str,
    keys: Vec<String>,
) {
    let client = Arc::clone(client);
    let bucket = bucket.to_owned();

    batches.spawn(async move {
        let count = keys.len();
        tracing::debug!(%bucket, count, "Deleting batch");
        client.delete_batch(&bucket, keys).await?;
        Ok(count)
    });
}
