//! esdump: one-shot export of an Elasticsearch index to compressed
//! newline-delimited JSON objects in S3.
//!
//! Documents are streamed with the scroll API, accumulated into batches
//! bounded by size and document count, gzipped, and uploaded by a fixed
//! pool of workers. A failed upload loses that batch and is reported; the
//! run continues and finishes with a summary.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

pub mod app_config;
mod batch;
mod common;
mod pipeline;
mod progress;
mod source;
mod store;

pub use app_config::AppConfig;
pub use pipeline::ExportSummary;

use pipeline::Destination;
use source::elasticsearch::EsScrollSource;
use store::s3::S3Store;

/// Runs one export from a validated configuration and returns the final
/// accounting. Errors here are fatal: nothing was exportable, or the source
/// went away mid-run.
pub async fn run(config: AppConfig) -> Result<ExportSummary> {
    info!(
        index = %config.source.index,
        bucket = %config.dest.bucket,
        prefix = %config.dest.path,
        "starting export"
    );

    let source = EsScrollSource::new(config.source.clone())
        .await
        .context("failed to connect to elasticsearch")?;
    let store = Arc::new(
        S3Store::new(&config.dest)
            .await
            .context("failed to build s3 client")?,
    );
    let dest = Destination {
        bucket: config.dest.bucket.clone(),
        prefix: config.dest.path.clone(),
    };

    pipeline::run_pipeline(source, store, dest, &config.source.index, &config.export).await
}
