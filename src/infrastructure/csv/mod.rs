// ============================================================
// CSV INFRASTRUCTURE
// ============================================================
// File-level detection, strict decoding and record streaming

pub mod csv_parser;
pub mod decoding_reader;
pub mod dialect_detector;
pub mod discovery;
pub mod encoding_detector;

pub use csv_parser::{CsvParser, CsvReadError, CsvRowReader, RowRead};
pub use decoding_reader::{validate_file, DecodeError, DecodingReader};
pub use dialect_detector::DialectDetector;
pub use discovery::discover_csv_files;
pub use encoding_detector::{EncodingDetector, EncodingGuess};
