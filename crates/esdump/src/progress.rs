//! Terminal progress for the driver loop.
//!
//! Elasticsearch does not say up front how many documents a scroll will
//! yield, so there is no percentage or ETA: just a spinner with running
//! totals, updated once per consumed page.

use indicatif::{ProgressBar, ProgressStyle};

const MIB: u64 = 1024 * 1024;

fn format_bytes(bytes: u64) -> String {
    if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} bytes")
    }
}

/// "1000000" → "1,000,000".
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

pub(crate) struct ProgressMetrics {
    index_name: String,
    total_bytes: u64,
    total_docs: u64,
    bar: ProgressBar,
}

impl ProgressMetrics {
    pub(crate) fn new(index_name: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                // template is hardcoded and valid
                .unwrap(),
        );
        bar.set_message(format!("exporting '{index_name}'"));
        Self {
            index_name: index_name.to_string(),
            total_bytes: 0,
            total_docs: 0,
            bar,
        }
    }

    pub(crate) fn update(&mut self, bytes_read: u64, docs_read: u64) {
        self.total_bytes += bytes_read;
        self.total_docs += docs_read;
        self.bar.set_message(format!(
            "exporting '{}': {} docs, {}",
            self.index_name,
            format_number(self.total_docs),
            format_bytes(self.total_bytes),
        ));
        self.bar.tick();
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
