//! Common data structures: the documents that flow from the scroll source
//! into batches, and the line encoding they are persisted with.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// One document as returned by the scroll API.
///
/// `_source` is kept as a [`RawValue`] so the payload passes through the
/// pipeline byte-for-byte without ever being parsed. `_routing` is absent for
/// most documents; some clusters also report it as an empty string, which is
/// treated the same as absent when encoding.
#[derive(Debug, Deserialize)]
pub(crate) struct ScanHit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_routing", default)]
    pub routing: Option<String>,
    #[serde(rename = "_source")]
    pub source: Box<RawValue>,
}

/// The persisted per-line shape: `_routing` is omitted entirely rather than
/// serialized as null, and `_source` is embedded as-is.
#[derive(Serialize)]
struct ExportDocument<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id")]
    id: &'a str,
    #[serde(rename = "_routing", skip_serializing_if = "Option::is_none")]
    routing: Option<&'a str>,
    #[serde(rename = "_source")]
    source: &'a RawValue,
}

/// Encodes a hit as one newline-terminated JSON line.
///
/// The uploaded objects are newline-delimited. A `_source` that was indexed
/// pretty-printed comes back with its whitespace intact, so any raw value
/// containing a newline is compacted first; only a genuine serialization
/// failure makes a document undumpable, and the caller drops it.
pub(crate) fn encode_line(hit: &ScanHit) -> Result<String> {
    let compacted;
    let source: &RawValue = if hit.source.get().contains('\n') {
        let value: serde_json::Value = serde_json::from_str(hit.source.get())
            .with_context(|| format!("could not parse _source of document '{}'", hit.id))?;
        compacted = serde_json::value::to_raw_value(&value)
            .with_context(|| format!("could not compact _source of document '{}'", hit.id))?;
        &compacted
    } else {
        &hit.source
    };
    let doc = ExportDocument {
        index: &hit.index,
        id: &hit.id,
        routing: hit.routing.as_deref().filter(|routing| !routing.is_empty()),
        source,
    };
    let mut line = serde_json::to_string(&doc)
        .with_context(|| format!("could not serialize document '{}'", hit.id))?;
    line.push('\n');
    Ok(line)
}
