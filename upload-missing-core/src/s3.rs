//! [`ObjectStore`] over the AWS S3 API (or any S3-compatible endpoint).

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectCannedAcl, ObjectIdentifier};
use tracing::debug;

use crate::store::{ListPage, ObjectStore, PutRequest, StoreError};

#[derive(Debug, Clone, Default)]
pub struct S3StoreConfig {
    pub bucket: String,
    pub region: Option<String>,
    /// Custom endpoint; switches the client to path-style addressing.
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl S3StoreConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }
}

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Builds a client from the standard AWS configuration chain, overridden
    /// by whatever `config` sets explicitly.
    ///
    /// SDK-level retries are disabled: callers apply their own retry policy.
    pub async fn connect(config: S3StoreConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "upload-missing",
            ));
        }
        let sdk_config = loader.load().await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).retry_config(RetryConfig::disabled());
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::new(Client::from_conf(builder.build()), config.bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let mut req = self.client.list_objects_v2().bucket(&self.bucket);
        if !prefix.is_empty() {
            req = req.prefix(prefix);
        }
        if let Some(token) = continuation {
            req = req.continuation_token(token);
        }

        let resp = req.send().await.map_err(|e| StoreError::List {
            prefix: prefix.to_string(),
            message: DisplayErrorContext(&e).to_string(),
        })?;

        let keys: Vec<String> = resp
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(str::to_string))
            .collect();
        let next_token = if resp.is_truncated() == Some(true) {
            resp.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        debug!(
            "listed {} keys from s3://{}/{prefix} (more: {})",
            keys.len(),
            self.bucket,
            next_token.is_some()
        );
        Ok(ListPage { keys, next_token })
    }

    async fn put_object(&self, request: PutRequest) -> Result<(), StoreError> {
        let PutRequest {
            key,
            acl,
            content_type,
            body,
        } = request;

        let body = ByteStream::read_from()
            .file(body)
            .build()
            .await
            .map_err(|e| StoreError::Body {
                key: key.clone(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .acl(ObjectCannedAcl::from(acl.as_str()))
            .content_type(&content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Put {
                key: key.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!("uploaded s3://{}/{key} ({content_type}, acl={acl})", self.bucket);
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Delete {
                message: e.to_string(),
            })?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StoreError::Delete {
                message: e.to_string(),
            })?;

        let resp = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StoreError::Delete {
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let rejected: Vec<String> = resp
            .errors()
            .iter()
            .map(|err| err.key().unwrap_or_default().to_string())
            .collect();
        if !rejected.is_empty() {
            return Err(StoreError::DeleteRejected { keys: rejected });
        }

        debug!("deleted {} keys from s3://{}", keys.len(), self.bucket);
        Ok(())
    }
}
