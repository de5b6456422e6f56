// ============================================================
// RUN SUMMARY
// ============================================================
// Per-file reports aggregated over one ingestion or drop run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::LoadOutcome;

/// Final state of one file in an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Loaded,
    /// No header or no data rows
    SkippedEmpty,
    /// The probe read failed under the detected and the latin1 encodings
    SkippedUnreadable,
    /// The destination table could not be created or truncated
    SchemaFailed,
    /// Every encoding failed to decode, or the sink rejected a chunk
    LoadFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub file: PathBuf,
    pub table: String,
    pub status: FileStatus,
    pub table_existed: bool,
    pub outcome: Option<LoadOutcome>,
    pub error: Option<String>,
}

impl FileReport {
    pub fn new(file: PathBuf, table: String, status: FileStatus) -> Self {
        Self {
            file,
            table,
            status,
            table_existed: false,
            outcome: None,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Result of an ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source_dir: PathBuf,
    pub schema: String,
    pub files: Vec<FileReport>,
}

impl RunSummary {
    pub fn count(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }

    pub fn loaded(&self) -> usize {
        self.count(FileStatus::Loaded)
    }

    pub fn skipped(&self) -> usize {
        self.count(FileStatus::SkippedEmpty) + self.count(FileStatus::SkippedUnreadable)
    }

    pub fn failed(&self) -> usize {
        self.count(FileStatus::SchemaFailed) + self.count(FileStatus::LoadFailed)
    }

    pub fn rows_inserted(&self) -> u64 {
        self.files
            .iter()
            .filter_map(|f| f.outcome.as_ref())
            .map(|o| o.rows_inserted)
            .sum()
    }
}

/// Result of a drop run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DropSummary {
    pub dry_run: bool,
    /// Tables targeted, in file order
    pub planned: Vec<String>,
    pub dropped: Vec<String>,
    pub missing: Vec<String>,
    pub failed: Vec<String>,
}
