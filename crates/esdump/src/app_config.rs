//! Configuration loading and validation.
//!
//! Settings come from environment variables prefixed `ESDUMP_` (with `__`
//! separating the section from the field, e.g. `ESDUMP_DEST__BUCKET`) and
//! optionally from a TOML file; the file wins where both are set.

use std::path::Path;

use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub source: EsSourceConfig,
    pub dest: S3SinkConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

/// Where documents are read from.
#[derive(Debug, Clone, Deserialize)]
pub struct EsSourceConfig {
    #[serde(default = "default_es_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// The single index to export. Required.
    #[serde(default)]
    pub index: String,
    /// Documents requested per scroll page.
    #[serde(default = "default_scroll_size")]
    pub scroll_size: usize,
    /// Server-side scroll context keep-alive, e.g. "5m".
    #[serde(default = "default_scroll_timeout")]
    pub scroll_timeout: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Where compressed objects are written.
#[derive(Debug, Clone, Deserialize)]
pub struct S3SinkConfig {
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// Required.
    #[serde(default)]
    pub bucket: String,
    /// Key prefix, concatenated verbatim in front of each object name.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Override for S3-compatible stores; implies path-style addressing.
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

/// Batching and concurrency knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// A batch is sealed once its uncompressed size reaches this many bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
    /// A batch is sealed once it holds this many documents.
    #[serde(default = "default_max_docs")]
    pub max_docs: usize,
    /// Upload worker pool size, also the upload queue capacity.
    #[serde(default = "default_max_uploads")]
    pub max_uploads: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_docs: default_max_docs(),
            max_uploads: default_max_uploads(),
        }
    }
}

fn default_es_url() -> String {
    "https://localhost:9200".to_string()
}

fn default_scroll_size() -> usize {
    10_000
}

fn default_scroll_timeout() -> String {
    "5m".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_s3_region() -> String {
    "us-west-2".to_string()
}

fn default_max_file_size() -> usize {
    32 * 1024 * 1024
}

fn default_max_docs() -> usize {
    1_000_000
}

fn default_max_uploads() -> usize {
    2
}

impl AppConfig {
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Env::prefixed("ESDUMP_").split("__"));
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file_exact(path));
        }
        let config: AppConfig = figment
            .extract()
            .context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.dest.bucket.is_empty() {
            bail!("destination bucket is required (dest.bucket / ESDUMP_DEST__BUCKET)");
        }
        if self.source.index.is_empty() {
            bail!("source index is required (source.index / ESDUMP_SOURCE__INDEX)");
        }
        if self.export.max_uploads == 0 {
            bail!("export.max_uploads must be at least 1");
        }
        Ok(())
    }
}
