use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, warn};
use upload_missing_core::{ObjectStore, StoreError};

use super::paths::strip_key_prefix;

#[derive(Debug, Error)]
#[error("listing prefix {prefix:?} failed on page {page}: {source}")]
pub struct ListError {
    pub prefix: String,
    pub page: usize,
    #[source]
    pub source: StoreError,
}

/// Relative names of every remote object under the key prefix, in the order
/// the listing returned them. Immutable once [`list_remote`] returns it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteObjectSet {
    names: Vec<String>,
    index: HashSet<String>,
}

impl RemoteObjectSet {
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    fn with_name(mut self, name: &str) -> Self {
        if self.index.insert(name.to_string()) {
            self.names.push(name.to_string());
        }
        self
    }

    /// Folds one page of raw keys into the set. Directory placeholders (the
    /// prefix itself or keys ending in `/`) are not files and are dropped, as
    /// are keys outside the prefix: they have no relative name and must never
    /// become delete targets.
    fn with_page(self, prefix: &str, keys: &[String]) -> Self {
        keys.iter().fold(self, |set, key| match strip_key_prefix(prefix, key) {
            Some(name) if !name.is_empty() && !name.ends_with('/') => set.with_name(name),
            Some(_) => set,
            None => {
                warn!("ignoring listed key {key:?} outside prefix {prefix:?}");
                set
            }
        })
    }
}

impl<S: AsRef<str>> FromIterator<S> for RemoteObjectSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::default(), |set, name| set.with_name(name.as_ref()))
    }
}

/// Pages through the listing under `prefix` until the store reports no more
/// pages. Any failed page abandons the whole listing; nothing is retried here.
pub async fn list_remote(
    store: &dyn ObjectStore,
    prefix: &str,
) -> Result<RemoteObjectSet, ListError> {
    let mut remote = RemoteObjectSet::default();
    let mut token: Option<String> = None;
    let mut page = 0usize;

    loop {
        page += 1;
        let listed = store
            .list_page(prefix, token.as_deref())
            .await
            .map_err(|source| ListError {
                prefix: prefix.to_string(),
                page,
                source,
            })?;
        debug!("list page {page}: {} keys", listed.keys.len());
        remote = remote.with_page(prefix, &listed.keys);

        match listed.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    Ok(remote)
}
