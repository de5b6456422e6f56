// ============================================================
// LOAD OUTCOME
// ============================================================
// Per-file data-quality and throughput statistics

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Delimiter, RowShape, TextEncoding};

/// Statistics for one successful load pass over a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOutcome {
    /// Encoding the successful pass decoded the file with
    pub encoding: String,

    /// Delimiter the file was split on
    pub delimiter: Delimiter,

    /// Header arity every row was conformed to
    pub columns: usize,

    /// Data records read after the header
    pub rows_processed: u64,

    /// Rows committed to the sink
    pub rows_inserted: u64,

    /// Rows whose field count differed from the header
    pub rows_divergent: u64,

    /// Divergent rows that lost trailing fields
    pub rows_truncated: u64,

    /// Divergent rows filled with NULLs
    pub rows_padded: u64,

    /// Blank lines, loaded as all-NULL rows (also counted as padded)
    pub rows_blank: u64,

    /// Fields discarded across all truncated rows
    pub fields_dropped: u64,

    /// Records the CSV reader could not parse
    pub rows_skipped: u64,

    /// Observed field count -> number of divergent rows with that count
    pub divergence: BTreeMap<usize, u64>,

    /// Encodings attempted, in order, including the successful one
    pub encodings_tried: Vec<String>,

    pub success: bool,
}

impl LoadOutcome {
    pub fn new(encoding: TextEncoding, delimiter: Delimiter, columns: usize) -> Self {
        Self {
            encoding: encoding.label().to_string(),
            delimiter,
            columns,
            rows_processed: 0,
            rows_inserted: 0,
            rows_divergent: 0,
            rows_truncated: 0,
            rows_padded: 0,
            rows_blank: 0,
            fields_dropped: 0,
            rows_skipped: 0,
            divergence: BTreeMap::new(),
            encodings_tried: Vec::new(),
            success: false,
        }
    }

    /// Tally one conformed row.
    pub fn record_shape(&mut self, shape: RowShape) {
        match shape {
            RowShape::Exact => {}
            RowShape::Padded { observed } => {
                self.rows_divergent += 1;
                self.rows_padded += 1;
                if observed == 0 {
                    self.rows_blank += 1;
                }
                *self.divergence.entry(observed).or_insert(0) += 1;
            }
            RowShape::Truncated { observed } => {
                self.rows_divergent += 1;
                self.rows_truncated += 1;
                self.fields_dropped += (observed - self.columns) as u64;
                *self.divergence.entry(observed).or_insert(0) += 1;
            }
        }
    }
}
