//! Source backends: where documents come from.

use anyhow::Result;
use async_trait::async_trait;

use crate::common::ScanHit;

pub(crate) mod elasticsearch;

/// A paginated document source.
///
/// # Contract
/// - `next_page` returns one page of hits per call, in source order.
/// - `Ok(None)` is the explicit exhausted signal; it is not an error.
/// - `Err(...)` is a per-page failure; the driver decides whether to keep
///   asking for further pages or give up.
#[async_trait]
pub(crate) trait Source {
    async fn next_page(&mut self) -> Result<Option<Vec<ScanHit>>>;
}
