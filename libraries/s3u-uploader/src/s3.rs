//! S3 sink built on the AWS SDK.

use crate::error::{Result, UploadError};
use crate::sink::ObjectSink;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use serde::Deserialize;
use std::fmt;
use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Name reported to the provider for static credentials
const CREDENTIALS_PROVIDER: &str = "s3-uploader";

/// Destination bucket and how to reach it
#[derive(Clone, Default, Deserialize)]
pub struct S3Settings {
    #[serde(default)]
    pub region: String,

    #[serde(default)]
    pub bucket: String,

    /// Custom endpoint URL (MinIO, Ceph, ...)
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    #[serde(default)]
    pub session_token: Option<String>,

    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`
    #[serde(default)]
    pub force_path_style: bool,
}

impl S3Settings {
    pub fn new(region: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Whether the client must be configured explicitly instead of from the
    /// default AWS provider chain
    pub fn is_explicit(&self) -> bool {
        self.endpoint.is_some() || self.access_key_id.is_some() || self.secret_access_key.is_some()
    }

    fn static_credentials(&self) -> Option<Credentials> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => Some(Credentials::new(
                access_key_id,
                secret_access_key,
                self.session_token.clone(),
                None,
                CREDENTIALS_PROVIDER,
            )),
            _ => None,
        }
    }
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");

        f.debug_struct("S3Settings")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &redact(&self.secret_access_key))
            .field("session_token", &redact(&self.session_token))
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

/// Stores objects in an S3 bucket with `PutObject`
#[derive(Debug, Clone)]
pub struct S3Sink {
    client: Client,
    bucket: String,
}

impl S3Sink {
    /// Build a client for the configured bucket
    ///
    /// With an endpoint or static keys the client is configured explicitly;
    /// otherwise the default AWS provider chain is used for the region.
    pub async fn connect(settings: &S3Settings) -> Result<Self> {
        if settings.region.is_empty() {
            return Err(UploadError::Config("S3 region is required".into()));
        }

        if settings.bucket.is_empty() {
            return Err(UploadError::Config("S3 bucket is required".into()));
        }

        let client = if settings.is_explicit() {
            let mut builder = aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new(settings.region.clone()))
                .force_path_style(settings.force_path_style);

            if let Some(endpoint) = &settings.endpoint {
                builder = builder.endpoint_url(endpoint);
            }

            if let Some(credentials) = settings.static_credentials() {
                builder = builder.credentials_provider(credentials);
            }

            Client::from_conf(builder.build())
        } else {
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(settings.region.clone()))
                .load()
                .await;

            let config = aws_sdk_s3::config::Builder::from(&shared)
                .force_path_style(settings.force_path_style)
                .build();

            Client::from_conf(config)
        };

        debug!(
            bucket = %settings.bucket,
            region = %settings.region,
            endpoint = ?settings.endpoint,
            "S3 client configured"
        );

        Ok(Self::with_client(client, settings.bucket.clone()))
    }

    /// Use an already configured client
    pub fn with_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectSink for S3Sink {
    async fn put_object(&self, key: &str, body: File, cancel: &CancellationToken) -> Result<()> {
        let body = ByteStream::read_from()
            .file(body)
            .build()
            .await
            .map_err(|e| UploadError::Io(std::io::Error::other(e)))?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send();

        // Dropping the request future aborts the transfer
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(UploadError::Cancelled),
            response = request => response.map(|_| ()).map_err(|e| UploadError::Transport {
                key: key.to_string(),
                message: DisplayErrorContext(e).to_string(),
            }),
        }
    }
}
