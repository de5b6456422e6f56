// ============================================================
// CSV PARSER
// ============================================================
// Stream CSV records under a chosen encoding and delimiter,
// conforming every data row to the header arity

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use thiserror::Error;
use tracing::warn;

use super::decoding_reader::{DecodeError, DecodingReader};
use crate::domain::csv::{Delimiter, NormalizedRow, TextEncoding};

/// Read failure that ends the current pass over a file.
#[derive(Debug, Error)]
pub enum CsvReadError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("failed to read file: {0}")]
    Io(io::Error),
}

impl From<io::Error> for CsvReadError {
    fn from(err: io::Error) -> Self {
        match DecodeError::from_io(&err) {
            Some(decode) => CsvReadError::Decode(decode),
            None => CsvReadError::Io(err),
        }
    }
}

/// One step of the record stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRead {
    /// A data row conformed to the header arity
    Row { line: u64, row: NormalizedRow },
    /// A record the CSV reader rejected; the stream continues after it
    Skipped { line: u64, reason: String },
}

/// CSV parser configuration
pub struct CsvParser {
    /// Delimiter character (default: comma)
    delimiter: Delimiter,

    /// Quote character (default: double quote)
    quote: u8,

    /// Internal buffer size of the CSV reader
    buffer_capacity: usize,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::Comma,
            quote: b'"',
            buffer_capacity: 64 * 1024,
        }
    }
}

impl CsvParser {
    /// Create a new CSV parser with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom delimiter
    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Open `path` decoded as `encoding` and read its header record.
    pub fn open(
        &self,
        path: &Path,
        encoding: TextEncoding,
    ) -> Result<CsvRowReader<DecodingReader<File>>, CsvReadError> {
        let source = DecodingReader::open(path, encoding)?;
        self.from_reader(source)
    }

    /// Wrap an already decoded stream and read its header record.
    ///
    /// Blank lines and unparseable records before the header are skipped.
    pub fn from_reader<R: Read>(&self, source: R) -> Result<CsvRowReader<R>, CsvReadError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter.as_byte())
            .quote(self.quote)
            .has_headers(false)
            .flexible(true) // Allow rows with different lengths
            .trim(Trim::None)
            .buffer_capacity(self.buffer_capacity)
            .from_reader(Tap::new(source));

        let mut record = StringRecord::new();
        let mut header = Vec::new();
        loop {
            match reader.read_record(&mut record) {
                Ok(false) => break,
                Ok(true) if is_blank(&record) => continue,
                Ok(true) => {
                    header = record.iter().map(|name| name.to_string()).collect();
                    break;
                }
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or(0);
                    let reason = fatal_or_parse(e)?;
                    warn!(line, reason = %reason, "Unparseable record before header skipped");
                }
            }
        }

        let end = reader.position().byte();
        let ended_cr = reader.get_mut().release(end).ended_cr;

        Ok(CsvRowReader {
            reader,
            header,
            record,
            pending: VecDeque::new(),
            ended_cr,
        })
    }
}

/// Streaming reader positioned after the header record.
pub struct CsvRowReader<R> {
    reader: csv::Reader<Tap<R>>,
    header: Vec<String>,
    record: StringRecord,
    /// Rows already read but not yet handed out
    pending: VecDeque<RowRead>,
    /// Whether the consumed text so far ends with `\r`
    ended_cr: bool,
}

impl<R: Read> CsvRowReader<R> {
    /// Raw header fields; empty when the file holds no records at all
    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn has_header(&self) -> bool {
        !self.header.is_empty()
    }

    /// Next data row. `Ok(None)` at end of input.
    ///
    /// A blank line after the header is a row with no fields, conformed to
    /// all NULLs.
    pub fn next_row(&mut self) -> Result<Option<RowRead>, CsvReadError> {
        if let Some(read) = self.pending.pop_front() {
            return Ok(Some(read));
        }

        let arity = self.header.len();
        match self.reader.read_record(&mut self.record) {
            Ok(false) => {
                let start = self.record.position().map(|p| p.line()).unwrap_or(0);
                self.queue_blank_lines(start);
            }
            Ok(true) => {
                let start = self.record.position().map(|p| p.line()).unwrap_or(0);
                let line = start + self.queue_blank_lines(start);
                let row = if is_blank(&self.record) {
                    NormalizedRow::blank(arity)
                } else {
                    NormalizedRow::conform(self.record.iter(), arity)
                };
                self.pending.push_back(RowRead::Row { line, row });
            }
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                let reason = fatal_or_parse(e)?;
                self.queue_blank_lines(line);
                self.pending.push_back(RowRead::Skipped { line, reason });
            }
        }
        Ok(self.pending.pop_front())
    }

    /// Queue one blank row per empty line the CSV reader passed over since
    /// the previous record. Returns the number of lines queued.
    fn queue_blank_lines(&mut self, start_line: u64) -> u64 {
        let end = self.reader.position().byte();
        let span = self.reader.get_mut().release(end);

        // a `\n` completing the previous record's `\r\n` is not a line
        let carried = u64::from(self.ended_cr && span.starts_lf);
        let blanks = span.terminators.saturating_sub(carried);
        self.ended_cr = span.ended_cr;

        let arity = self.header.len();
        for k in 0..blanks {
            self.pending.push_back(RowRead::Row {
                line: start_line + carried + k,
                row: NormalizedRow::blank(arity),
            });
        }
        blanks + carried
    }
}

/// Line terminators found in a released stretch of text.
#[derive(Debug, Clone, Copy, Default)]
struct Released {
    /// Terminators before the first byte of record text
    terminators: u64,
    starts_lf: bool,
    ended_cr: bool,
}

/// Keeps what the CSV reader pulled from the source until the reader's
/// position moves past it, so the text between two records can be
/// inspected. The CSV reader drops empty lines without reporting them.
struct Tap<R> {
    inner: R,
    seen: Vec<u8>,
    /// Stream offset of `seen[0]`
    base: u64,
}

impl<R> Tap<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            seen: Vec::new(),
            base: 0,
        }
    }

    /// Forget everything before stream offset `end`, reporting the line
    /// terminators at the start of the forgotten text.
    fn release(&mut self, end: u64) -> Released {
        let len = (end.saturating_sub(self.base) as usize).min(self.seen.len());
        let consumed = &self.seen[..len];
        let lead = consumed
            .iter()
            .take_while(|b| matches!(b, b'\r' | b'\n'))
            .count();

        let released = Released {
            terminators: count_terminators(&consumed[..lead]),
            starts_lf: consumed.first() == Some(&b'\n'),
            ended_cr: consumed.last() == Some(&b'\r'),
        };
        self.seen.drain(..len);
        self.base += len as u64;
        released
    }
}

impl<R: Read> Read for Tap<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.seen.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

/// `\r\n`, `\r` and `\n` each end one line.
fn count_terminators(bytes: &[u8]) -> u64 {
    let mut count = 0;
    let mut iter = bytes.iter().peekable();
    while let Some(&b) = iter.next() {
        match b {
            b'\n' => count += 1,
            b'\r' => {
                count += 1;
                if iter.peek() == Some(&&b'\n') {
                    iter.next();
                }
            }
            _ => {}
        }
    }
    count
}

/// Split CSV errors into pass-ending read failures and per-record problems.
fn fatal_or_parse(err: csv::Error) -> Result<String, CsvReadError> {
    let reason = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(io_err) => Err(io_err.into()),
        _ => Ok(reason),
    }
}

fn is_blank(record: &StringRecord) -> bool {
    record.len() == 1 && record[0].trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::csv::RowShape;
    use std::io::Cursor;

    fn rows_of(content: &str, delimiter: Delimiter) -> (Vec<String>, Vec<RowRead>) {
        let parser = CsvParser::new().with_delimiter(delimiter);
        let mut reader = parser.from_reader(Cursor::new(content.to_string())).unwrap();
        let header = reader.header().to_vec();

        let mut rows = Vec::new();
        while let Some(row) = reader.next_row().unwrap() {
            rows.push(row);
        }
        (header, rows)
    }

    fn values(read: &RowRead) -> Vec<Option<&str>> {
        match read {
            RowRead::Row { row, .. } => row.values.iter().map(|v| v.as_deref()).collect(),
            RowRead::Skipped { .. } => panic!("expected a row"),
        }
    }

    #[test]
    fn test_parse_repairs_shapes() {
        let (header, rows) = rows_of("id,val\n1,a\n2,b,extra\n3\n", Delimiter::Comma);

        assert_eq!(header, vec!["id", "val"]);
        assert_eq!(rows.len(), 3);
        assert_eq!(values(&rows[0]), vec![Some("1"), Some("a")]);
        assert_eq!(values(&rows[1]), vec![Some("2"), Some("b")]);
        assert_eq!(values(&rows[2]), vec![Some("3"), None]);

        match &rows[1] {
            RowRead::Row { line, row } => {
                assert_eq!(*line, 3);
                assert_eq!(row.shape, RowShape::Truncated { observed: 3 });
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_quoted_fields_keep_delimiters_and_newlines() {
        let content = "id;note\n1;\"a;b\"\n2;\"multi\nline\"\n";
        let (_, rows) = rows_of(content, Delimiter::Semicolon);

        assert_eq!(rows.len(), 2);
        assert_eq!(values(&rows[0]), vec![Some("1"), Some("a;b")]);
        assert_eq!(values(&rows[1]), vec![Some("2"), Some("multi\nline")]);
    }

    #[test]
    fn test_blank_lines_after_header_are_null_rows() {
        let (header, rows) = rows_of("\n\nid,val\n\n1,a\n   \n2,b\n\n", Delimiter::Comma);
        assert_eq!(header, vec!["id", "val"]);

        let shapes: Vec<Vec<Option<&str>>> = rows.iter().map(values).collect();
        assert_eq!(
            shapes,
            vec![
                vec![None, None],
                vec![Some("1"), Some("a")],
                vec![None, None],
                vec![Some("2"), Some("b")],
                vec![None, None],
            ]
        );
        match &rows[0] {
            RowRead::Row { line, row } => {
                assert_eq!(*line, 4);
                assert!(row.shape.is_blank());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_blank_lines_with_crlf_endings() {
        let (_, rows) = rows_of("id,val\r\n1,a\r\n\r\n\r\n2,b\r\n", Delimiter::Comma);

        let blank = rows
            .iter()
            .filter(|r| matches!(r, RowRead::Row { row, .. } if row.shape.is_blank()))
            .count();
        assert_eq!(rows.len(), 4);
        assert_eq!(blank, 2);
        assert_eq!(values(&rows[3]), vec![Some("2"), Some("b")]);
    }

    #[test]
    fn test_unparseable_record_before_header_is_skipped() {
        let bytes = b"\xff\xfe\nid,val\n1,a\n".to_vec();
        let mut reader = CsvParser::new().from_reader(Cursor::new(bytes)).unwrap();

        assert_eq!(reader.header(), &["id", "val"]);
        assert!(matches!(reader.next_row(), Ok(Some(RowRead::Row { .. }))));
        assert!(reader.next_row().unwrap().is_none());
    }

    #[test]
    fn test_empty_input_has_no_header() {
        let parser = CsvParser::new();
        let mut reader = parser.from_reader(Cursor::new(String::new())).unwrap();
        assert!(!reader.has_header());
        assert!(reader.next_row().unwrap().is_none());
    }

    #[test]
    fn test_decode_failure_ends_the_stream() {
        let mut bytes = b"id,name\n1,ok\n".to_vec();
        bytes.extend(b"2,\xff\n");
        let source = DecodingReader::new(Cursor::new(bytes), TextEncoding::Utf8);

        let mut reader = CsvParser::new().from_reader(source).unwrap();
        assert_eq!(reader.header(), &["id", "name"]);
        assert!(matches!(reader.next_row(), Ok(Some(RowRead::Row { .. }))));
        assert!(matches!(reader.next_row(), Err(CsvReadError::Decode(_))));
    }
}
