//! The batch accumulator: the driver appends encoded lines into a live
//! buffer and seals it into an immutable batch once a split limit is hit.

use std::mem;

/// Which limit caused a split. Byte size wins when both are hit at once;
/// the distinction only affects what gets logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SplitTrigger {
    MaxBytes,
    MaxDocs,
}

/// An immutable snapshot of accumulated lines, ready for compression and
/// upload. Once produced it is owned by exactly one upload job.
#[derive(Debug)]
pub(crate) struct SealedBatch {
    pub data: Vec<u8>,
    pub doc_count: usize,
}

/// The live buffer. Owned exclusively by the pipeline driver; sealing hands
/// the contents off by value and leaves a fresh empty buffer behind, so an
/// in-flight upload can never observe later appends.
#[derive(Debug, Default)]
pub(crate) struct BatchAccumulator {
    buf: String,
    doc_count: usize,
}

impl BatchAccumulator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends one already-encoded, newline-terminated line.
    pub(crate) fn append(&mut self, line: &str) {
        self.buf.push_str(line);
        self.doc_count += 1;
    }

    pub(crate) fn byte_size(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn doc_count(&self) -> usize {
        self.doc_count
    }

    /// Checked after every append. Returns the triggering limit, if any.
    pub(crate) fn should_split(&self, max_bytes: usize, max_docs: usize) -> Option<SplitTrigger> {
        if self.buf.len() >= max_bytes {
            Some(SplitTrigger::MaxBytes)
        } else if self.doc_count >= max_docs {
            Some(SplitTrigger::MaxDocs)
        } else {
            None
        }
    }

    /// Freezes the current contents and resets the accumulator to empty.
    pub(crate) fn seal(&mut self) -> SealedBatch {
        SealedBatch {
            data: mem::take(&mut self.buf).into_bytes(),
            doc_count: mem::take(&mut self.doc_count),
        }
    }

    /// Flushes a trailing partial batch at source exhaustion, if there is one.
    pub(crate) fn seal_if_non_empty(&mut self) -> Option<SealedBatch> {
        if self.doc_count == 0 {
            None
        } else {
            Some(self.seal())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_appended_lines_exactly() {
        let mut acc = BatchAccumulator::new();
        acc.append("{\"a\":1}\n");
        acc.append("{\"b\":22}\n");
        assert_eq!(acc.doc_count(), 2);
        assert_eq!(acc.byte_size(), 8 + 9);
    }

    #[test]
    fn splits_on_doc_count() {
        let mut acc = BatchAccumulator::new();
        acc.append("{}\n");
        assert_eq!(acc.should_split(usize::MAX, 2), None);
        acc.append("{}\n");
        assert_eq!(acc.should_split(usize::MAX, 2), Some(SplitTrigger::MaxDocs));
    }

    #[test]
    fn splits_on_byte_size() {
        let mut acc = BatchAccumulator::new();
        acc.append("0123456789\n");
        assert_eq!(acc.should_split(8, usize::MAX), Some(SplitTrigger::MaxBytes));
    }

    #[test]
    fn byte_limit_takes_precedence_when_both_hit() {
        let mut acc = BatchAccumulator::new();
        acc.append("0123456789\n");
        assert_eq!(acc.should_split(1, 1), Some(SplitTrigger::MaxBytes));
    }

    #[test]
    fn seal_returns_contents_and_resets_counters() {
        let mut acc = BatchAccumulator::new();
        acc.append("{\"a\":1}\n");
        let batch = acc.seal();
        assert_eq!(batch.data, b"{\"a\":1}\n");
        assert_eq!(batch.doc_count, 1);
        assert_eq!(acc.byte_size(), 0);
        assert_eq!(acc.doc_count(), 0);
    }

    #[test]
    fn sealed_batch_is_immune_to_later_appends() {
        let mut acc = BatchAccumulator::new();
        acc.append("first\n");
        let batch = acc.seal();
        acc.append("second\n");
        assert_eq!(batch.data, b"first\n");
    }

    #[test]
    fn seal_if_non_empty_skips_an_empty_buffer() {
        let mut acc = BatchAccumulator::new();
        assert!(acc.seal_if_non_empty().is_none());
        acc.append("{}\n");
        let batch = acc.seal_if_non_empty().expect("one doc pending");
        assert_eq!(batch.doc_count, 1);
    }
}
