//! The export pipeline: a single driver consuming scroll pages, a batch
//! accumulator deciding split points, and a fixed pool of upload workers
//! behind a bounded queue.
//!
//! The queue capacity equals the pool size, so a full queue with busy
//! workers blocks the driver's hand-off. That blocking is the pipeline's
//! only backpressure: page consumption slows to match upload throughput.

mod worker;

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::app_config::ExportConfig;
use crate::batch::{BatchAccumulator, SealedBatch, SplitTrigger};
use crate::common;
use crate::progress::ProgressMetrics;
use crate::source::Source;
use crate::store::ObjectStore;
use worker::{UploadFailure, UploadJob, UploadWorker, Worker, start_error_sink};

/// Where produced objects land.
#[derive(Debug, Clone)]
pub(crate) struct Destination {
    pub bucket: String,
    /// Concatenated verbatim in front of each object name.
    pub prefix: String,
}

/// Final accounting for one export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    /// Documents that were encoded and batched.
    pub total_docs: u64,
    /// Documents skipped because they could not be encoded.
    pub dropped_docs: u64,
    /// Objects produced; file indices ran `0..files` with no gaps.
    pub files: u64,
    /// Upload jobs that failed; their data is gone, the run still completed.
    pub failed_uploads: u64,
}

/// A page-fetch error is logged and retried, but this many failures in a row
/// means the source is not coming back. Retrying indefinitely would also be
/// a defensible reading of best-effort paging; the bound is a deliberate
/// tightening so a cluster that dies mid-scroll fails the run instead of
/// spinning forever.
const MAX_CONSECUTIVE_PAGE_FAILURES: u32 = 3;

pub(crate) fn object_key(prefix: &str, index_name: &str, file_index: u64) -> String {
    format!("{prefix}{index_name}_s_{file_index}.json.gz")
}

async fn submit(
    jobs: &async_channel::Sender<UploadJob>,
    batch: SealedBatch,
    dest: &Destination,
    index_name: &str,
    file_index: u64,
) -> Result<()> {
    let job = UploadJob {
        key: object_key(&dest.prefix, index_name, file_index),
        bucket: dest.bucket.clone(),
        doc_count: batch.doc_count,
        data: batch.data,
    };
    // blocks while all workers are busy and the queue is full
    jobs.send(job)
        .await
        .map_err(|_| anyhow::anyhow!("upload queue closed while the driver was still producing"))
}

pub(crate) async fn run_pipeline<S, O>(
    mut source: S,
    store: Arc<O>,
    dest: Destination,
    index_name: &str,
    export: &ExportConfig,
) -> Result<ExportSummary>
where
    S: Source,
    O: ObjectStore + 'static,
{
    // workers and the error sink come up before anything is produced
    let (job_tx, job_rx) = async_channel::bounded::<UploadJob>(export.max_uploads);
    let (failure_tx, failure_rx) = async_channel::unbounded::<UploadFailure>();
    let error_sink = start_error_sink(failure_rx);

    debug!(workers = export.max_uploads, "starting upload workers");
    let workers: Vec<_> = (1..=export.max_uploads)
        .map(|id| {
            UploadWorker::new(id, job_rx.clone(), failure_tx.clone(), Arc::clone(&store)).start()
        })
        .collect();
    // only the workers may keep these ends alive: the queue closes when the
    // driver drops its sender, and the failure channel closes when the last
    // worker exits
    drop(job_rx);
    drop(failure_tx);

    let mut accumulator = BatchAccumulator::new();
    let mut progress = ProgressMetrics::new(index_name);
    let mut file_index: u64 = 0;
    let mut total_docs: u64 = 0;
    let mut dropped_docs: u64 = 0;
    let mut consecutive_page_failures: u32 = 0;

    loop {
        let page = match source.next_page().await {
            Ok(page) => {
                consecutive_page_failures = 0;
                page
            }
            Err(err) => {
                consecutive_page_failures += 1;
                if consecutive_page_failures >= MAX_CONSECUTIVE_PAGE_FAILURES {
                    return Err(err.context(format!(
                        "giving up after {consecutive_page_failures} consecutive page fetch failures"
                    )));
                }
                warn!("error fetching page, continuing: {err:#}");
                continue;
            }
        };
        let Some(hits) = page else { break };

        let mut page_docs: u64 = 0;
        let mut page_bytes: u64 = 0;
        for hit in &hits {
            let line = match common::encode_line(hit) {
                Ok(line) => line,
                Err(err) => {
                    dropped_docs += 1;
                    warn!(id = %hit.id, "skipping document: {err:#}");
                    continue;
                }
            };
            page_bytes += line.len() as u64;
            page_docs += 1;
            accumulator.append(&line);
            total_docs += 1;

            if let Some(trigger) = accumulator.should_split(export.max_file_size, export.max_docs) {
                match trigger {
                    SplitTrigger::MaxBytes => info!(
                        bytes = accumulator.byte_size(),
                        limit = export.max_file_size,
                        split = file_index,
                        "met max file size limit, uploading split"
                    ),
                    SplitTrigger::MaxDocs => info!(
                        docs = accumulator.doc_count(),
                        limit = export.max_docs,
                        split = file_index,
                        "met max doc count limit, uploading split"
                    ),
                }
                let batch = accumulator.seal();
                submit(&job_tx, batch, &dest, index_name, file_index).await?;
                file_index += 1;
            }
        }
        progress.update(page_bytes, page_docs);
    }

    // drain: flush the trailing partial batch, close the queue, wait for the
    // workers, and only then let the error sink finish
    if let Some(batch) = accumulator.seal_if_non_empty() {
        info!(
            docs = batch.doc_count,
            split = file_index,
            "shipping final partial batch"
        );
        submit(&job_tx, batch, &dest, index_name, file_index).await?;
        file_index += 1;
    }
    drop(job_tx);

    for handle in join_all(workers).await {
        handle.context("upload worker panicked")??;
    }
    let failed_uploads = error_sink.await.context("error sink panicked")?;
    progress.finish();

    info!(
        total_docs,
        files = file_index,
        dropped = dropped_docs,
        failed_uploads,
        "met end of scroll, export complete"
    );
    Ok(ExportSummary {
        total_docs,
        dropped_docs,
        files: file_index,
        failed_uploads,
    })
}
