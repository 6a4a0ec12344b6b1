use kdeal_core::RawFeedRow;
use serde::{Deserialize, Serialize};

use crate::csv::FeedDocument;

/// One window of feed lines, as handed out by the resumable fetch step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedChunk {
    pub chunk_index: usize,
    /// Rows in the window that carry both an id and a title.
    pub rows: Vec<RawFeedRow>,
    /// Data lines in the whole feed.
    pub total_count: usize,
    pub has_more: bool,
    pub next_chunk_index: Option<usize>,
    /// Lines in the window dropped for a field-count mismatch.
    pub skipped_rows: usize,
}

impl FeedChunk {
    /// Cut window `chunk_index` of `chunk_size` data lines out of `doc`.
    #[must_use]
    pub fn from_document(doc: &FeedDocument<'_>, chunk_index: usize, chunk_size: usize) -> Self {
        let total_count = doc.data_line_count();
        let start = chunk_index.saturating_mul(chunk_size);
        let end = start.saturating_add(chunk_size).min(total_count);

        let mut parsed = doc.window(start, chunk_size);
        let unidentified = parsed.retain_identified();
        let has_more = end < total_count;

        tracing::info!(
            chunk_index,
            start,
            end,
            total_count,
            rows = parsed.rows.len(),
            skipped = parsed.skipped_rows,
            unidentified,
            "feed chunk parsed"
        );

        Self {
            chunk_index,
            rows: parsed.rows,
            total_count,
            has_more,
            next_chunk_index: has_more.then_some(chunk_index + 1),
            skipped_rows: parsed.skipped_rows,
        }
    }
}
