mod s3;
mod store;

pub use s3::{S3Store, S3StoreConfig};
pub use store::{ListPage, MAX_DELETE_BATCH, ObjectStore, PutRequest, StoreError};
