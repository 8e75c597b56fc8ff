//! Command-line entry point: parse arguments, load configuration, set up
//! logging, run one export, print the summary.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};
use esdump::{AppConfig, ExportSummary};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Export an Elasticsearch index to gzipped NDJSON objects in S3.
#[derive(Debug, Parser)]
#[command(name = "esdump", version, about)]
struct Args {
    /// TOML configuration file; settings may also come from ESDUMP_*
    /// environment variables.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging (same as RUST_LOG=debug).
    #[arg(long)]
    debug: bool,
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

fn print_summary(index: &str, summary: &ExportSummary) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["index", "documents", "dropped", "files", "failed uploads"]);
    table.add_row([
        index.to_string(),
        summary.total_docs.to_string(),
        summary.dropped_docs.to_string(),
        summary.files.to_string(),
        summary.failed_uploads.to_string(),
    ]);
    println!("{table}");
}

fn report_error(err: &anyhow::Error) {
    error!("export failed: {err}");
    let mut connection_trouble = false;
    for cause in err.chain().skip(1) {
        error!("cause: {cause}");
        let cause = cause.to_string();
        if cause.contains("connection refused")
            || cause.contains("Connection refused")
            || cause.contains("dns error")
            || cause.contains("error sending request")
        {
            connection_trouble = true;
        }
    }
    if connection_trouble {
        error!(
            "hint: a backing service looks unreachable; check that elasticsearch \
             and the s3 endpoint are up and that the configured urls are correct"
        );
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.debug);

    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            report_error(&err);
            return Ok(ExitCode::FAILURE);
        }
    };

    let index = config.source.index.clone();
    match esdump::run(config).await {
        Ok(summary) => {
            print_summary(&index, &summary);
            // best-effort delivery: failed uploads show in the summary but
            // a completed run still exits zero
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            report_error(&err);
            Ok(ExitCode::FAILURE)
        }
    }
}
