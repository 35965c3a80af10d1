use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};
use upload_missing_core::{ObjectStore, PutRequest, StoreError};

use super::access::{self, Access};
use super::mime::content_type_for;
use super::paths::remote_key;
use super::retry::{ExhaustedRetries, RetryPolicy};

pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 2;
pub const PRIVATE_ACL: &str = "private";

/// Failure of a single put attempt.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to open {path:?}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("{0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("upload of {name} failed: {source}")]
    Upload {
        name: String,
        #[source]
        source: ExhaustedRetries<UploadError>,
    },
    #[error("upload task did not complete: {0}")]
    Join(#[from] JoinError),
    #[error("concurrency limiter is closed")]
    ConcurrencyClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    pub acl: String,
    pub repair_permissions: bool,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            acl: PRIVATE_ACL.to_string(),
            repair_permissions: false,
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    /// Position in the missing list; used to label progress output.
    pub index: usize,
    pub name: String,
    pub local_path: PathBuf,
    pub remote_key: String,
    pub content_type: &'static str,
    pub acl: String,
    pub chmod_applied: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub skipped: usize,
    pub retries: u32,
}

enum Outcome {
    Uploaded { retries: u32 },
    Skipped,
}

#[derive(Clone)]
pub struct TransferPipeline {
    store: Arc<dyn ObjectStore>,
    root: PathBuf,
    prefix: String,
    options: TransferOptions,
}

impl TransferPipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        root: impl Into<PathBuf>,
        prefix: impl Into<String>,
        options: TransferOptions,
    ) -> Self {
        Self {
            store,
            root: root.into(),
            prefix: prefix.into(),
            options,
        }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    pub fn task_for(&self, index: usize, name: &str) -> TransferTask {
        TransferTask {
            index,
            name: name.to_string(),
            local_path: self.root.join(name),
            remote_key: remote_key(&self.prefix, name),
            content_type: content_type_for(name),
            acl: self.options.acl.clone(),
            chmod_applied: false,
        }
    }

    /// Uploads every name in `missing`, at most `concurrency` at a time.
    ///
    /// The first task to exhaust its retries stops admission of further
    /// tasks. Tasks already running are awaited (so permission repairs are
    /// undone) and the first error is returned.
    pub async fn upload(&self, missing: &[String]) -> Result<UploadSummary, TransferError> {
        let total = missing.len();
        let limit = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let failed = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();
        let mut summary = UploadSummary::default();
        let mut first_error = None;

        for (index, name) in missing.iter().enumerate() {
            let permit = limit
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| TransferError::ConcurrencyClosed)?;
            while let Some(joined) = tasks.try_join_next() {
                record(joined, &mut summary, &mut first_error);
            }
            if failed.load(Ordering::Acquire) || first_error.is_some() {
                debug!("not admitting {name}: an earlier upload failed");
                break;
            }

            let task = self.task_for(index, name);
            let pipeline = self.clone();
            let failed = Arc::clone(&failed);
            tasks.spawn(async move {
                let outcome = pipeline.run_task(task, total).await;
                if outcome.is_err() {
                    failed.store(true, Ordering::Release);
                }
                drop(permit);
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            record(joined, &mut summary, &mut first_error);
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    async fn run_task(
        &self,
        mut task: TransferTask,
        total: usize,
    ) -> Result<Outcome, TransferError> {
        let label = format!("[{}/{total}] {}", task.index + 1, task.name);

        let repair = if self.options.repair_permissions {
            match access::ensure_readable(&task.local_path).await {
                Ok(Access::Readable) => None,
                Ok(Access::Repaired(repair)) => {
                    debug!(
                        "{label}: relaxed mode {:o} for upload, forcing private acl",
                        repair.original_mode()
                    );
                    task.chmod_applied = true;
                    task.acl = PRIVATE_ACL.to_string();
                    Some(repair)
                }
                Err(err) => {
                    warn!("{label}: skipping, permissions cannot be repaired: {err}");
                    return Ok(Outcome::Skipped);
                }
            }
        } else {
            None
        };

        info!("{label}: uploading to {}", task.remote_key);
        let task_ref = &task;
        let result = self
            .options
            .retry
            .run(&label, |_| self.put_once(task_ref))
            .await;

        if let Some(repair) = repair {
            if let Err(err) = repair.restore().await {
                warn!(
                    "{label}: failed to restore mode {:o}: {err}",
                    repair.original_mode()
                );
            }
        }

        match result {
            Ok(done) => Ok(Outcome::Uploaded {
                retries: done.retries,
            }),
            Err(source) => Err(TransferError::Upload {
                name: task.name,
                source,
            }),
        }
    }

    async fn put_once(&self, task: &TransferTask) -> Result<(), UploadError> {
        let body = open_body(&task.local_path).await?;
        self.store
            .put_object(PutRequest {
                key: task.remote_key.clone(),
                acl: task.acl.clone(),
                content_type: task.content_type.to_string(),
                body,
            })
            .await?;
        Ok(())
    }
}

async fn open_body(path: &Path) -> Result<tokio::fs::File, UploadError> {
    tokio::fs::File::open(path)
        .await
        .map_err(|source| UploadError::Open {
            path: path.to_path_buf(),
            source,
        })
}

fn record(
    joined: Result<Result<Outcome, TransferError>, JoinError>,
    summary: &mut UploadSummary,
    first_error: &mut Option<TransferError>,
) {
    match joined.map_err(TransferError::from).and_then(|outcome| outcome) {
        Ok(Outcome::Uploaded { retries }) => {
            summary.uploaded += 1;
            summary.retries += retries;
        }
        Ok(Outcome::Skipped) => summary.skipped += 1,
        Err(err) => {
            if first_error.is_none() {
                *first_error = Some(err);
            } else {
                debug!("discarding later upload failure: {err}");
            }
        }
    }
}
