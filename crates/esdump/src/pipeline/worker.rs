//! The upload worker pool and the error sink it reports into.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::ObjectStore;

/// A sealed batch with its destination. Owned by exactly one worker once
/// dequeued; no two workers ever observe the same job.
#[derive(Debug)]
pub(crate) struct UploadJob {
    pub data: Vec<u8>,
    pub bucket: String,
    pub key: String,
    pub doc_count: usize,
}

/// Failure notice forwarded to the error sink. The batch is not retried;
/// the run continues with the remaining batches.
#[derive(Debug)]
pub(crate) struct UploadFailure {
    pub bucket: String,
    pub key: String,
    pub error: anyhow::Error,
}

pub(crate) trait Worker {
    fn start(self) -> JoinHandle<Result<()>>;
}

/// One member of the pool: dequeue, compress, put, report.
pub(crate) struct UploadWorker<O> {
    id: usize,
    jobs: Receiver<UploadJob>,
    failures: Sender<UploadFailure>,
    store: Arc<O>,
}

impl<O: ObjectStore + 'static> UploadWorker<O> {
    pub(crate) fn new(
        id: usize,
        jobs: Receiver<UploadJob>,
        failures: Sender<UploadFailure>,
        store: Arc<O>,
    ) -> Self {
        Self {
            id,
            jobs,
            failures,
            store,
        }
    }

    async fn upload(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        let compressed = gzip_compress(data).context("failed to compress batch")?;
        self.store.put_object(bucket, key, compressed).await
    }
}

impl<O: ObjectStore + 'static> Worker for UploadWorker<O> {
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!(worker = self.id, "upload worker started");
            while let Ok(job) = self.jobs.recv().await {
                debug!(
                    worker = self.id,
                    key = %job.key,
                    bytes = job.data.len(),
                    "started upload job"
                );
                match self.upload(&job.bucket, &job.key, &job.data).await {
                    Ok(()) => info!(
                        worker = self.id,
                        key = %job.key,
                        bucket = %job.bucket,
                        docs = job.doc_count,
                        "uploaded object"
                    ),
                    Err(error) => {
                        let notice = UploadFailure {
                            bucket: job.bucket,
                            key: job.key,
                            error,
                        };
                        // the failure channel is unbounded, so this never blocks
                        if self.failures.send(notice).await.is_err() {
                            warn!(worker = self.id, "error sink closed before worker shutdown");
                        }
                    }
                }
            }
            debug!(worker = self.id, "job queue closed and drained, worker exiting");
            Ok(())
        })
    }
}

/// Whole-buffer gzip of a sealed batch; no streaming, no per-line framing
/// beyond the newlines already in the data.
pub(crate) fn gzip_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Drains failure notices from all workers, logging each one. Returns how
/// many it saw once every sender is gone.
pub(crate) fn start_error_sink(failures: Receiver<UploadFailure>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut count = 0u64;
        while let Ok(failure) = failures.recv().await {
            count += 1;
            warn!(
                key = %failure.key,
                bucket = %failure.bucket,
                "upload failed, continuing with remaining batches: {:#}",
                failure.error
            );
        }
        count
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn gzip_output_decompresses_to_the_input() {
        let input = b"{\"a\":1}\n{\"b\":2}\n";
        let compressed = gzip_compress(input).unwrap();
        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, input);
    }
}
