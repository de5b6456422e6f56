// ============================================================
// CSV DOMAIN LAYER
// ============================================================
// Core types and value objects for CSV ingestion
// No I/O, no async

mod column_schema;
mod delimiter;
mod ingest_settings;
mod load_outcome;
mod naming;
mod row;
mod run_summary;
mod table_identity;
mod text_encoding;

pub use column_schema::{ColumnSchema, TEXT_COLUMN_TYPE};
pub use delimiter::Delimiter;
pub use ingest_settings::{IngestSettings, DEFAULT_CHUNK_SIZE, DEFAULT_PROBE_ROWS, DEFAULT_SCHEMA};
pub use load_outcome::LoadOutcome;
pub use naming::{quote_identifier, sanitize_identifier, table_name_for, MAX_IDENTIFIER_LEN};
pub use row::{NormalizedRow, RowShape, RowValues};
pub use run_summary::{DropSummary, FileReport, FileStatus, RunSummary};
pub use table_identity::{SourceFile, TableIdentity};
pub use text_encoding::TextEncoding;
