use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, info};
use upload_missing_core::{MAX_DELETE_BATCH, ObjectStore};

use super::delete::{BatchDeleter, DeleteError};
use super::diff::diff;
use super::lister::{ListError, list_remote};
use super::local::{self, ScanError};
use super::transfer::{TransferError, TransferOptions, TransferPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Listing,
    Diffing,
    Uploading,
    Deleting,
    Done,
    Failed,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("local scan failed: {0}")]
    Scan(#[from] ScanError),
    #[error("local scan did not complete: {0}")]
    ScanTask(#[from] JoinError),
    #[error("remote listing failed: {0}")]
    List(#[from] ListError),
    #[error("upload failed: {0}")]
    Transfer(#[from] TransferError),
    #[error("delete failed: {0}")]
    Delete(#[from] DeleteError),
}

impl SyncError {
    /// Phase that was running when the error surfaced.
    pub fn phase(&self) -> Phase {
        match self {
            SyncError::Scan(_) | SyncError::ScanTask(_) | SyncError::List(_) => Phase::Listing,
            SyncError::Transfer(_) => Phase::Uploading,
            SyncError::Delete(_) => Phase::Deleting,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub local_root: PathBuf,
    /// Already normalized with [`key_prefix`](super::paths::key_prefix).
    pub key_prefix: String,
    pub delete: bool,
    pub delete_batch_size: usize,
    pub transfer: TransferOptions,
}

impl SyncOptions {
    pub fn new(local_root: impl Into<PathBuf>, key_prefix: impl Into<String>) -> Self {
        Self {
            local_root: local_root.into(),
            key_prefix: key_prefix.into(),
            delete: false,
            delete_batch_size: MAX_DELETE_BATCH,
            transfer: TransferOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub local: usize,
    pub remote: usize,
    pub missing: usize,
    pub found: usize,
    pub deleted: usize,
    pub uploaded: usize,
    pub skipped: usize,
}

/// Runs one mirror pass: list, diff, upload, delete. Phases run strictly in
/// that order and the first unrecovered failure ends the run.
pub struct SyncEngine {
    store: Arc<dyn ObjectStore>,
    options: SyncOptions,
    phase: Phase,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn ObjectStore>, options: SyncOptions) -> Self {
        Self {
            store,
            options,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub async fn run(&mut self) -> Result<SyncReport, SyncError> {
        match self.run_phases().await {
            Ok(report) => {
                self.enter(Phase::Done);
                Ok(report)
            }
            Err(err) => {
                self.enter(Phase::Failed);
                Err(err)
            }
        }
    }

    async fn run_phases(&mut self) -> Result<SyncReport, SyncError> {
        self.enter(Phase::Listing);
        let root = self.options.local_root.clone();
        let local = tokio::task::spawn_blocking(move || local::scan(&root)).await??;
        let local: Vec<String> = local.into_iter().map(|file| file.name).collect();
        let remote = list_remote(self.store.as_ref(), &self.options.key_prefix).await?;
        info!("Local files: {}, remote objects: {}", local.len(), remote.len());

        self.enter(Phase::Diffing);
        let diff = diff(&local, &remote, self.options.delete);
        info!("Missing files: {}", diff.missing.len());
        info!("Found files: {}", diff.found);
        if self.options.delete {
            info!("Deleted files: {}", diff.deleted.len());
        }

        self.enter(Phase::Uploading);
        let upload = TransferPipeline::new(
            Arc::clone(&self.store),
            &self.options.local_root,
            &self.options.key_prefix,
            self.options.transfer.clone(),
        )
        .upload(&diff.missing)
        .await?;
        if upload.skipped > 0 {
            info!("Skipped files: {}", upload.skipped);
        }

        self.enter(Phase::Deleting);
        let deleted = if self.options.delete {
            BatchDeleter::new(
                Arc::clone(&self.store),
                &self.options.key_prefix,
                self.options.transfer.retry,
            )
            .with_batch_size(self.options.delete_batch_size)
            .delete_all(&diff.deleted)
            .await?
        } else {
            0
        };

        Ok(SyncReport {
            local: local.len(),
            remote: remote.len(),
            missing: diff.missing.len(),
            found: diff.found,
            deleted,
            uploaded: upload.uploaded,
            skipped: upload.skipped,
        })
    }

    fn enter(&mut self, next: Phase) {
        debug!("phase {:?} -> {next:?}", self.phase);
        self.phase = next;
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
