//! The storage client seam.
//!
//! The execution engine only depends on the [`ObjectStore`] trait and the
//! construction parameters in [`ClientConfig`]; everything SDK-specific is
//! contained in [`S3Client`]. Tests substitute their own implementations.

use std::fmt;

use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;

use crate::config::{ClientConfig, SigningScheme};

/// A type-erased [`ObjectStore`] instance.
pub type BoxedStore = std::sync::Arc<dyn ObjectStore>;

/// The put/get primitives the execution engine drives.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Stores `payload` under `key`, with an optional `Content-Encoding`.
    async fn put(
        &self,
        key: &str,
        payload: Bytes,
        content_encoding: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Retrieves the object under `key`, draining the body.
    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;
}

/// Errors from a single storage operation.
///
/// These are always recovered locally: the executor converts them into a
/// failed operation result and the run continues.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Network-level failure: connection refused, timeout, TLS failure, or a
    /// broken body stream.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The endpoint returned an error response, e.g. `NoSuchKey` on a
    /// download of a non-existent object or `AccessDenied`.
    #[error("storage service error {code}: {message}")]
    Service {
        /// The service-reported error code.
        code: String,
        /// The service-reported error message.
        message: String,
    },
}

impl StorageError {
    /// A short label for grouping failures in the report.
    pub fn cause(&self) -> String {
        match self {
            StorageError::Transport(_) => "transport".to_owned(),
            StorageError::Service { code, .. } => code.clone(),
        }
    }
}

fn classify<E>(err: SdkError<E>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match err {
        SdkError::ServiceError(context) => {
            let err = context.into_err();
            StorageError::Service {
                code: err.code().unwrap_or("unknown").to_owned(),
                message: err
                    .message()
                    .map(str::to_owned)
                    .unwrap_or_else(|| err.to_string()),
            }
        }
        other => StorageError::Transport(Box::new(other)),
    }
}

/// An [`ObjectStore`] implementation backed by an S3-compatible endpoint.
pub struct S3Client {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Client {
    /// Creates a client bound to the given bucket.
    ///
    /// The bucket is assumed to exist. Connections are pooled and shared by
    /// all workers; nothing on the client is mutated after construction.
    pub fn new(config: &ClientConfig, bucket: &str) -> Self {
        if config.signing == SigningScheme::Legacy {
            tracing::warn!(
                "legacy signing scheme requested; using SigV4 with path-style addressing"
            );
        }

        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "s3pt",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint_url())
            .credentials_provider(credentials)
            .force_path_style(config.signing == SigningScheme::Legacy);

        if let Some(request_timeout) = config.request_timeout {
            builder = builder.timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(request_timeout)
                    .build(),
            );
        }

        tracing::debug!(
            endpoint = %config.endpoint_url(),
            keep_alive = config.keep_alive,
            "constructed storage client"
        );

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: bucket.to_owned(),
        }
    }
}

impl fmt::Debug for S3Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Client")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3Client {
    async fn put(
        &self,
        key: &str,
        payload: Bytes,
        content_encoding: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(payload));

        if let Some(encoding) = content_encoding {
            request = request.content_encoding(encoding);
        }

        request.send().await.map_err(classify)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(classify)?;

        // The body is drained so the full request/response cycle is timed,
        // but its contents are not validated.
        let data = response
            .body
            .collect()
            .await
            .map_err(|err| StorageError::Transport(Box::new(err)))?;

        Ok(data.into_bytes())
    }
}
