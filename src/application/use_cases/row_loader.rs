// ============================================================
// RESILIENT ROW LOADER USE CASE
// ============================================================
// Stream a CSV file into its table in committed chunks, repairing row
// shapes and falling back across candidate encodings on decode errors

use std::io;
use std::path::Path;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::domain::csv::{
    ColumnSchema, Delimiter, LoadOutcome, RowValues, TableIdentity, TextEncoding,
    DEFAULT_CHUNK_SIZE,
};
use crate::domain::error::SinkError;
use crate::infrastructure::csv::{
    validate_file, CsvParser, CsvReadError, DecodeError, DialectDetector, RowRead,
};
use crate::infrastructure::db::Sink;

/// Why a single pass over the file stopped.
#[derive(Debug, Error)]
pub enum PassError {
    /// The candidate encoding cannot decode the file; try the next one
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("sink rejected chunk: {0}")]
    Sink(#[from] SinkError),

    #[error("failed to read file: {0}")]
    Io(io::Error),

    #[error("file has no header row")]
    Empty,

    #[error("header has {found} columns, table expects {expected}")]
    HeaderMismatch { expected: usize, found: usize },
}

impl From<io::Error> for PassError {
    fn from(err: io::Error) -> Self {
        match DecodeError::from_io(&err) {
            Some(decode) => PassError::Decode(decode),
            None => PassError::Io(err),
        }
    }
}

impl From<CsvReadError> for PassError {
    fn from(err: CsvReadError) -> Self {
        match err {
            CsvReadError::Decode(decode) => PassError::Decode(decode),
            CsvReadError::Io(io) => PassError::Io(io),
        }
    }
}

/// Why a file could not be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no candidate encoding could decode the file (tried {}){}",
        .tried.join(", "),
        .last.as_ref().map(|e| format!(": {}", e)).unwrap_or_default())]
    EncodingsExhausted {
        tried: Vec<String>,
        last: Option<DecodeError>,
    },

    /// Chunks committed before the failure stay in the table
    #[error("chunk insert failed after {} rows: {source}", .outcome.rows_inserted)]
    Sink {
        outcome: Box<LoadOutcome>,
        source: SinkError,
    },

    #[error("failed to read file: {0}")]
    Io(io::Error),

    #[error("file has no header row")]
    Empty,

    #[error("header has {found} columns, table expects {expected}")]
    HeaderMismatch { expected: usize, found: usize },
}

impl LoadError {
    /// Statistics gathered before the failure, if any rows were attempted.
    pub fn partial_outcome(&self) -> Option<&LoadOutcome> {
        match self {
            LoadError::Sink { outcome, .. } => Some(outcome.as_ref()),
            _ => None,
        }
    }
}

pub struct ResilientRowLoader {
    chunk_size: usize,
}

impl Default for ResilientRowLoader {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ResilientRowLoader {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Load `path` into `table`, trying `preferred` first and then the
    /// fallback encodings until one pass reads the whole file.
    pub async fn load<S: Sink + ?Sized>(
        &self,
        sink: &mut S,
        table: &TableIdentity,
        schema: &ColumnSchema,
        path: &Path,
        preferred: TextEncoding,
    ) -> Result<LoadOutcome, LoadError> {
        let started = Instant::now();
        let delimiter = DialectDetector::detect(path, preferred);
        let candidates = TextEncoding::ranked_candidates(preferred);

        let mut tried = Vec::with_capacity(candidates.len());
        let mut last_decode = None;

        for encoding in candidates {
            tried.push(encoding.label().to_string());
            info!(file = %path.display(), table = %table, encoding = %encoding, "Starting load pass");

            let mut outcome = LoadOutcome::new(encoding, delimiter, schema.len());
            match self
                .pass(sink, table, schema, path, encoding, delimiter, &mut outcome)
                .await
            {
                Ok(()) => {
                    outcome.success = true;
                    outcome.encodings_tried = tried;
                    log_outcome(path, table, &outcome, started);
                    return Ok(outcome);
                }
                Err(PassError::Decode(e)) => {
                    warn!(
                        file = %path.display(),
                        encoding = %encoding,
                        error = %e,
                        "Decode failed, trying next encoding"
                    );
                    last_decode = Some(e);
                }
                Err(PassError::Sink(source)) => {
                    error!(
                        file = %path.display(),
                        table = %table,
                        rows = outcome.rows_inserted,
                        error = %source,
                        "Chunk insert failed, abandoning file"
                    );
                    outcome.encodings_tried = tried;
                    return Err(LoadError::Sink {
                        outcome: Box::new(outcome),
                        source,
                    });
                }
                Err(PassError::Io(e)) => return Err(LoadError::Io(e)),
                Err(PassError::Empty) => return Err(LoadError::Empty),
                Err(PassError::HeaderMismatch { expected, found }) => {
                    return Err(LoadError::HeaderMismatch { expected, found })
                }
            }
        }

        error!(
            file = %path.display(),
            tried = %tried.join(", "),
            "All candidate encodings failed"
        );
        Err(LoadError::EncodingsExhausted {
            tried,
            last: last_decode,
        })
    }

    /// One full pass under `encoding`. The whole file is decoded once before
    /// the first insert so a decode failure never leaves rows behind.
    #[allow(clippy::too_many_arguments)]
    async fn pass<S: Sink + ?Sized>(
        &self,
        sink: &mut S,
        table: &TableIdentity,
        schema: &ColumnSchema,
        path: &Path,
        encoding: TextEncoding,
        delimiter: Delimiter,
        outcome: &mut LoadOutcome,
    ) -> Result<(), PassError> {
        validate_file(path, encoding)?;

        let mut reader = CsvParser::new()
            .with_delimiter(delimiter)
            .open(path, encoding)?;
        if !reader.has_header() {
            return Err(PassError::Empty);
        }

        // Rows go in under the table's column names. A fallback encoding can
        // spell a non-ASCII header differently, so only the count is checked.
        let found = reader.header().len();
        if found != schema.len() {
            return Err(PassError::HeaderMismatch {
                expected: schema.len(),
                found,
            });
        }

        let mut batch: Vec<RowValues> = Vec::with_capacity(self.chunk_size.min(4096));
        while let Some(read) = reader.next_row()? {
            match read {
                RowRead::Row { line, row } => {
                    outcome.rows_processed += 1;
                    if row.shape.is_divergent() {
                        debug!(
                            file = %path.display(),
                            line,
                            expected = schema.len(),
                            observed = row.shape.observed(schema.len()),
                            "Row column count differs from header"
                        );
                    }
                    outcome.record_shape(row.shape);
                    batch.push(row.values);

                    if batch.len() >= self.chunk_size {
                        self.flush(sink, table, schema, &mut batch, outcome).await?;
                    }
                }
                RowRead::Skipped { line, reason } => {
                    outcome.rows_skipped += 1;
                    warn!(file = %path.display(), line, reason = %reason, "Unparseable record skipped");
                }
            }
        }

        if !batch.is_empty() {
            self.flush(sink, table, schema, &mut batch, outcome).await?;
        }
        Ok(())
    }

    /// Insert and commit one chunk; a failure rolls the chunk back.
    async fn flush<S: Sink + ?Sized>(
        &self,
        sink: &mut S,
        table: &TableIdentity,
        columns: &ColumnSchema,
        batch: &mut Vec<RowValues>,
        outcome: &mut LoadOutcome,
    ) -> Result<(), SinkError> {
        let written = match sink.insert_rows(table, columns, batch).await {
            Ok(written) => sink.commit().await.map(|_| written),
            Err(e) => Err(e),
        };

        match written {
            Ok(written) => {
                outcome.rows_inserted += written;
                batch.clear();
                info!(
                    table = %table,
                    rows = written,
                    total = outcome.rows_inserted,
                    "Chunk committed"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = sink.rollback().await {
                    warn!(error = %rollback, "Rollback after failed chunk failed");
                }
                Err(e)
            }
        }
    }
}

fn log_outcome(path: &Path, table: &TableIdentity, outcome: &LoadOutcome, started: Instant) {
    info!(
        file = %path.display(),
        table = %table,
        encoding = %outcome.encoding,
        delimiter = %outcome.delimiter,
        rows_processed = outcome.rows_processed,
        rows_inserted = outcome.rows_inserted,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "File loaded"
    );

    if outcome.rows_divergent > 0 {
        let histogram = outcome
            .divergence
            .iter()
            .map(|(arity, count)| format!("{} fields: {}", arity, count))
            .collect::<Vec<_>>()
            .join(", ");
        warn!(
            file = %path.display(),
            rows_divergent = outcome.rows_divergent,
            rows_truncated = outcome.rows_truncated,
            rows_padded = outcome.rows_padded,
            fields_dropped = outcome.fields_dropped,
            divergence = %histogram,
            "Rows repaired to header arity"
        );
    }
    if outcome.rows_skipped > 0 {
        warn!(file = %path.display(), rows_skipped = outcome.rows_skipped, "Records skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::memory::MemorySink;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup(bytes: &[u8], columns: &[&str]) -> (TempDir, PathBuf, TableIdentity, ColumnSchema, MemorySink) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, bytes).unwrap();

        let table = TableIdentity::new("public", "data");
        let schema = ColumnSchema::from_header(columns);
        let sink = MemorySink::new().with_table(&table, columns, Vec::new());
        (dir, path, table, schema, sink)
    }

    fn text(values: &[Option<&str>]) -> RowValues {
        values.iter().map(|v| v.map(|s| s.to_string())).collect()
    }

    #[tokio::test]
    async fn test_three_row_scenario() {
        let (_dir, path, table, schema, mut sink) =
            setup(b"id,val\n1,a\n2,b,extra\n3\n", &["id", "val"]);

        let outcome = ResilientRowLoader::new(10)
            .load(&mut sink, &table, &schema, &path, TextEncoding::Utf8)
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.rows_processed, 3);
        assert_eq!(outcome.rows_inserted, 3);
        assert_eq!(outcome.rows_divergent, 2);
        assert_eq!(outcome.divergence.get(&3), Some(&1));
        assert_eq!(outcome.divergence.get(&1), Some(&1));
        assert_eq!(outcome.rows_truncated, 1);
        assert_eq!(outcome.fields_dropped, 1);

        assert_eq!(
            sink.committed_rows(&table),
            vec![
                text(&[Some("1"), Some("a")]),
                text(&[Some("2"), Some("b")]),
                text(&[Some("3"), None]),
            ]
        );
    }

    #[tokio::test]
    async fn test_rows_are_committed_in_chunks() {
        let mut content = String::from("n\n");
        for i in 0..25 {
            content.push_str(&format!("{}\n", i));
        }
        let (_dir, path, table, schema, mut sink) = setup(content.as_bytes(), &["n"]);

        let outcome = ResilientRowLoader::new(10)
            .load(&mut sink, &table, &schema, &path, TextEncoding::Utf8)
            .await
            .unwrap();

        assert_eq!(outcome.rows_inserted, 25);
        assert_eq!(sink.commits(), 3);
        assert!(outcome.rows_inserted <= outcome.rows_processed);
    }

    #[tokio::test]
    async fn test_decode_failure_falls_back_without_leftover_rows() {
        // 0xE9 is invalid as UTF-8 but fine in latin1; it sits after the first chunk
        let mut content = b"nome;cidade\n".to_vec();
        for i in 0..30 {
            content.extend(format!("linha{};x\n", i).as_bytes());
        }
        content.extend(b"Jos\xe9;Bel\xe9m\n");
        let (_dir, path, table, schema, mut sink) = setup(&content, &["nome", "cidade"]);

        let outcome = ResilientRowLoader::new(10)
            .load(&mut sink, &table, &schema, &path, TextEncoding::Utf8)
            .await
            .unwrap();

        assert_eq!(outcome.encoding, "latin1");
        assert_eq!(outcome.encodings_tried, vec!["utf-8", "latin1"]);
        assert_eq!(outcome.delimiter, Delimiter::Semicolon);

        let rows = sink.committed_rows(&table);
        assert_eq!(rows.len(), 31);
        assert_eq!(rows[30], text(&[Some("José"), Some("Belém")]));
    }

    #[tokio::test]
    async fn test_fallback_pass_inserts_under_table_columns() {
        // UTF-8 header, latin1 body: the latin1 pass reads the header as "CÃ³digo"
        let mut content = "Código;nome\n1;a\n".as_bytes().to_vec();
        content.extend(b"2;Jos\xe9\n");
        let (_dir, path, table, schema, mut sink) = setup(&content, &["Código", "nome"]);

        let outcome = ResilientRowLoader::new(10)
            .load(&mut sink, &table, &schema, &path, TextEncoding::Utf8)
            .await
            .unwrap();

        assert_eq!(outcome.encoding, "latin1");
        assert_eq!(sink.committed_table(&table).unwrap().columns, vec!["C_digo", "nome"]);
        assert_eq!(
            sink.committed_rows(&table),
            vec![text(&[Some("1"), Some("a")]), text(&[Some("2"), Some("José")])]
        );
    }

    #[tokio::test]
    async fn test_blank_lines_are_processed_as_null_rows() {
        let (_dir, path, table, schema, mut sink) =
            setup(b"id,val\n1,a\n\n2,b\n", &["id", "val"]);

        let outcome = ResilientRowLoader::new(10)
            .load(&mut sink, &table, &schema, &path, TextEncoding::Utf8)
            .await
            .unwrap();

        assert_eq!(outcome.rows_processed, 3);
        assert_eq!(outcome.rows_inserted, 3);
        assert_eq!(outcome.rows_blank, 1);
        assert_eq!(outcome.divergence.get(&0), Some(&1));
        assert_eq!(sink.committed_rows(&table)[1], text(&[None, None]));
    }

    #[tokio::test]
    async fn test_chunk_failure_keeps_earlier_chunks() {
        let mut content = String::from("n\n");
        for i in 0..25 {
            content.push_str(&format!("{}\n", i));
        }
        let (_dir, path, table, schema, sink) = setup(content.as_bytes(), &["n"]);
        let mut sink = sink.fail_insert_call(2);

        let err = ResilientRowLoader::new(10)
            .load(&mut sink, &table, &schema, &path, TextEncoding::Utf8)
            .await
            .unwrap_err();

        let partial = err.partial_outcome().unwrap();
        assert_eq!(partial.rows_inserted, 10);
        assert!(!partial.success);
        assert_eq!(sink.committed_rows(&table).len(), 10);
        assert_eq!(sink.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_header_only_file_loads_nothing() {
        let (_dir, path, table, schema, mut sink) = setup(b"id,val\n", &["id", "val"]);

        let outcome = ResilientRowLoader::new(10)
            .load(&mut sink, &table, &schema, &path, TextEncoding::Utf8)
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.rows_processed, 0);
        assert_eq!(outcome.rows_inserted, 0);
        assert_eq!(sink.commits(), 0);
    }

    #[tokio::test]
    async fn test_empty_file_is_reported_as_empty() {
        let (_dir, path, table, schema, mut sink) = setup(b"", &["id"]);

        let err = ResilientRowLoader::new(10)
            .load(&mut sink, &table, &schema, &path, TextEncoding::Utf8)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Empty));
    }

    #[tokio::test]
    async fn test_fallback_chain_ends_at_latin1() {
        let (_dir, path, table, schema, mut sink) = setup(b"a\n\x81\n", &["a"]);

        let result = ResilientRowLoader::new(10)
            .load(&mut sink, &table, &schema, &path, TextEncoding::Ascii)
            .await;

        let outcome = result.unwrap();
        assert_eq!(outcome.encoding, "latin1");
        assert_eq!(outcome.encodings_tried, vec!["ascii", "utf-8", "latin1"]);
    }
}
