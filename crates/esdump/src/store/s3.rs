//! S3 destination.
//!
//! Credentials come from the config when both keys are set, otherwise from
//! the standard AWS resolution chain (env vars, shared config, IAM role).
//! An `endpoint_url` override with path-style addressing is supported for
//! S3-compatible stores such as MinIO.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use crate::app_config::S3SinkConfig;
use crate::store::ObjectStore;

pub(crate) struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub(crate) async fn new(config: &S3SinkConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                loader = loader.credentials_provider(Credentials::from_keys(
                    access_key.clone(),
                    secret_key.clone(),
                    None,
                ));
            }
            _ => debug!("no static s3 credentials configured, using the default aws chain"),
        }

        let shared = loader.load().await;
        let mut builder = S3ConfigBuilder::from(&shared);
        if let Some(endpoint_url) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url).force_path_style(true);
        }

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map(|_| ())
            .with_context(|| format!("failed to put s3://{bucket}/{key}"))
    }
}
