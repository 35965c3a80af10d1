use std::path::PathBuf;
use std::time::Duration;

use upload_missing_core::S3StoreConfig;

use crate::sync::engine::SyncOptions;
use crate::sync::paths::key_prefix;
use crate::sync::retry::{Backoff, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, RetryPolicy};
use crate::sync::transfer::{DEFAULT_UPLOAD_CONCURRENCY, PRIVATE_ACL, TransferOptions};

pub const CONCURRENCY_ENV: &str = "UPLOAD_MISSING_CONCURRENCY";
pub const MAX_ATTEMPTS_ENV: &str = "UPLOAD_MISSING_MAX_ATTEMPTS";
pub const BACKOFF_MS_ENV: &str = "UPLOAD_MISSING_BACKOFF_MS";
pub const ENDPOINT_ENV: &str = "UPLOAD_MISSING_ENDPOINT";

const DEFAULT_BACKOFF_MS: u64 = 100;

/// Everything one run needs: the three positional arguments, the flags and
/// the environment tuning knobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    pub local_root: PathBuf,
    pub bucket: String,
    pub remote_path: String,
    pub acl: String,
    pub delete: bool,
    pub chmod_if_needed: bool,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub endpoint: Option<String>,
}

impl SyncConfig {
    pub fn new(
        local_root: impl Into<PathBuf>,
        bucket: impl Into<String>,
        remote_path: impl Into<String>,
    ) -> Self {
        Self {
            local_root: local_root.into(),
            bucket: bucket.into(),
            remote_path: remote_path.into(),
            acl: PRIVATE_ACL.to_string(),
            delete: false,
            chmod_if_needed: false,
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_MS),
            endpoint: None,
        }
    }

    /// Applies the `UPLOAD_MISSING_*` variables from the process environment.
    pub fn with_env(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`. Unparsable or zero values keep the
    /// current setting.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        self.concurrency = read_u64(&lookup, CONCURRENCY_ENV)
            .and_then(|value| usize::try_from(value).ok())
            .unwrap_or(self.concurrency);
        self.max_attempts = read_u64(&lookup, MAX_ATTEMPTS_ENV)
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(self.max_attempts);
        self.backoff_base = read_u64(&lookup, BACKOFF_MS_ENV)
            .map(Duration::from_millis)
            .unwrap_or(self.backoff_base);
        if let Some(endpoint) = lookup(ENDPOINT_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            self.endpoint = Some(endpoint);
        }
        self
    }

    pub fn key_prefix(&self) -> String {
        key_prefix(&self.remote_path)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Backoff::new(self.backoff_base, DEFAULT_MAX_DELAY, true),
        )
    }

    pub fn sync_options(&self) -> SyncOptions {
        let mut options = SyncOptions::new(&self.local_root, self.key_prefix());
        options.delete = self.delete;
        options.transfer = TransferOptions {
            acl: self.acl.clone(),
            repair_permissions: self.chmod_if_needed,
            concurrency: self.concurrency,
            retry: self.retry_policy(),
        };
        options
    }

    pub fn store_config(&self) -> S3StoreConfig {
        let config = S3StoreConfig::new(&self.bucket);
        match &self.endpoint {
            Some(endpoint) => config.with_endpoint(endpoint),
            None => config,
        }
    }
}

fn read_u64<F>(lookup: &F, name: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
}
