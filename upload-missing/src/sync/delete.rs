use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use upload_missing_core::{MAX_DELETE_BATCH, ObjectStore, StoreError};

use super::paths::remote_key;
use super::retry::{ExhaustedRetries, RetryPolicy};

#[derive(Debug, Error)]
#[error("delete batch {batch}/{batches} failed: {source}")]
pub struct DeleteError {
    pub batch: usize,
    pub batches: usize,
    #[source]
    pub source: ExhaustedRetries<StoreError>,
}

/// Splits `items` into consecutive batches of at most `batch_size` (clamped
/// to `1..=MAX_DELETE_BATCH`).
pub fn partition<T>(items: &[T], batch_size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(batch_size.clamp(1, MAX_DELETE_BATCH))
}

pub struct BatchDeleter {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    batch_size: usize,
    retry: RetryPolicy,
}

impl BatchDeleter {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            batch_size: MAX_DELETE_BATCH,
            retry,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Deletes the remote objects for `deleted`, one batch at a time. A batch
    /// that exhausts its retries aborts the remaining batches.
    pub async fn delete_all(&self, deleted: &[String]) -> Result<usize, DeleteError> {
        if deleted.is_empty() {
            return Ok(0);
        }

        let keys: Vec<String> = deleted
            .iter()
            .map(|name| remote_key(&self.prefix, name))
            .collect();
        let batches = partition(&keys, self.batch_size);
        let total = batches.len();

        for (index, batch) in batches.enumerate() {
            let label = format!("delete batch {}/{total}", index + 1);
            info!("{label}: {} keys", batch.len());
            self.retry
                .run(&label, |_| self.store.delete_objects(batch))
                .await
                .map_err(|source| DeleteError {
                    batch: index + 1,
                    batches: total,
                    source,
                })?;
        }

        Ok(keys.len())
    }
}
