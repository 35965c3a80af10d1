use async_trait::async_trait;
use thiserror::Error;

/// Largest key list a single batch delete may carry.
pub const MAX_DELETE_BATCH: usize = 1000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("list request failed under prefix {prefix:?}: {message}")]
    List { prefix: String, message: String },
    #[error("put request failed for {key}: {message}")]
    Put { key: String, message: String },
    #[error("delete request failed: {message}")]
    Delete { message: String },
    #[error("delete rejected {} key(s): {}", keys.len(), keys.join(", "))]
    DeleteRejected { keys: Vec<String> },
    #[error("failed to prepare body for {key}: {message}")]
    Body { key: String, message: String },
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Continuation token for the next page; `None` once the listing is exhausted.
    pub next_token: Option<String>,
}

impl ListPage {
    pub fn is_last(&self) -> bool {
        self.next_token.is_none()
    }
}

#[derive(Debug)]
pub struct PutRequest {
    pub key: String,
    pub acl: String,
    pub content_type: String,
    /// Freshly opened handle; consumed by the request.
    pub body: tokio::fs::File,
}

/// Object storage operations the sync engine relies on.
///
/// Implementations address a single bucket fixed at construction time.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError>;

    async fn put_object(&self, request: PutRequest) -> Result<(), StoreError>;

    /// Deletes up to [`MAX_DELETE_BATCH`] keys in one call. A response that
    /// reports per-key failures is an error.
    async fn delete_objects(&self, keys: &[String]) -> Result<(), StoreError>;
}
