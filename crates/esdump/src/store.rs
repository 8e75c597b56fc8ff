//! Destination backends: where compressed batch objects land.

use anyhow::Result;
use async_trait::async_trait;

pub(crate) mod s3;

/// A write-only object store.
///
/// `&self` because the upload workers share one client; implementations must
/// be safe to call concurrently up to the worker-pool size.
#[async_trait]
pub(crate) trait ObjectStore: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()>;
}
