// ============================================================
// INGESTION ORCHESTRATOR USE CASE
// ============================================================
// Drive every CSV file of a directory through detection, table
// creation and loading over one sink connection

use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::row_loader::{LoadError, ResilientRowLoader};
use super::schema_synthesizer::SchemaSynthesizer;
use crate::domain::csv::{
    FileReport, FileStatus, IngestSettings, RunSummary, SourceFile, TableIdentity, TextEncoding,
};
use crate::domain::error::{AppError, SinkError};
use crate::infrastructure::csv::{
    discover_csv_files, CsvParser, CsvReadError, DialectDetector, EncodingDetector, RowRead,
};
use crate::infrastructure::db::{Sink, SinkConnector};

/// Failures that stop a whole run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("source directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("invalid source directory pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Connection(SinkError),
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Settings(msg) => AppError::ConfigError(msg),
            IngestError::MissingDirectory(path) => {
                AppError::NotFound(format!("source directory {}", path.display()))
            }
            IngestError::Pattern(e) => AppError::ValidationError(e.to_string()),
            IngestError::Connection(e) => AppError::DatabaseError(e.to_string()),
        }
    }
}

/// What a short read of the first rows revealed.
#[derive(Debug, Clone)]
struct Probe {
    encoding: TextEncoding,
    header: Vec<String>,
    data_rows: usize,
}

pub struct IngestionOrchestrator {
    settings: IngestSettings,
    detector: EncodingDetector,
    loader: ResilientRowLoader,
}

impl IngestionOrchestrator {
    pub fn new(settings: IngestSettings) -> Self {
        let loader = ResilientRowLoader::new(settings.chunk_size);
        Self {
            settings,
            detector: EncodingDetector::new(),
            loader,
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Load every `*.csv` in `source_dir`. Only an invalid setup or a failed
    /// connection is an error; per-file problems land in the summary.
    pub async fn run<C: SinkConnector>(
        &self,
        source_dir: &Path,
        connector: &C,
    ) -> Result<RunSummary, IngestError> {
        self.settings.validate().map_err(IngestError::Settings)?;
        if !source_dir.is_dir() {
            return Err(IngestError::MissingDirectory(source_dir.to_path_buf()));
        }

        let started_at = Utc::now();
        let mut sink = connector.connect().await.map_err(|e| {
            log_connection_failure(&e);
            IngestError::Connection(e)
        })?;

        let files = match discover_csv_files(source_dir) {
            Ok(files) => files,
            Err(e) => {
                sink.close().await;
                return Err(e.into());
            }
        };

        if files.is_empty() {
            warn!(dir = %source_dir.display(), "No CSV files found");
        } else {
            info!(dir = %source_dir.display(), files = files.len(), "Starting ingestion");
        }

        let mut reports = Vec::with_capacity(files.len());
        for (index, path) in files.iter().enumerate() {
            info!(
                file = %path.display(),
                progress = %format!("{}/{}", index + 1, files.len()),
                "Processing file"
            );
            reports.push(self.process_file(&mut sink, path).await);
        }

        sink.close().await;

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            source_dir: source_dir.to_path_buf(),
            schema: self.settings.schema.clone(),
            files: reports,
        };
        info!(
            files = summary.files.len(),
            loaded = summary.loaded(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            rows_inserted = summary.rows_inserted(),
            "Ingestion finished"
        );
        Ok(summary)
    }

    async fn process_file<S: Sink + ?Sized>(&self, sink: &mut S, path: &Path) -> FileReport {
        let source = SourceFile::from_path(path);
        let table = TableIdentity::for_source(&self.settings.schema, &source);
        let report = |status| FileReport::new(path.to_path_buf(), table.to_string(), status);

        let detected = self.detector.detect(path);
        let probe = match self.probe_with_fallback(path, detected) {
            Ok(probe) => probe,
            Err(e) => {
                error!(file = %path.display(), error = %e, "File unreadable, skipping");
                return report(FileStatus::SkippedUnreadable).with_error(e);
            }
        };

        if probe.header.is_empty() || probe.data_rows == 0 {
            warn!(file = %path.display(), "File has no data rows, skipping");
            return report(FileStatus::SkippedEmpty);
        }

        let ensured = match SchemaSynthesizer::ensure_table(
            sink,
            &table,
            &probe.header,
            self.settings.truncate_existing,
        )
        .await
        {
            Ok(ensured) => ensured,
            Err(e) => {
                error!(file = %path.display(), table = %table, error = %e, "Table setup failed, skipping file");
                let mut failed = report(FileStatus::SchemaFailed).with_error(&e);
                failed.table_existed = e.table_existed();
                return failed;
            }
        };

        let result = self
            .loader
            .load(sink, &ensured.table, &ensured.columns, path, probe.encoding)
            .await;

        let mut done = match result {
            Ok(outcome) => {
                let mut loaded = report(FileStatus::Loaded);
                loaded.outcome = Some(outcome);
                loaded
            }
            Err(LoadError::Empty) => report(FileStatus::SkippedEmpty),
            Err(e) => {
                error!(file = %path.display(), table = %table, error = %e, "Load failed");
                let mut failed = report(FileStatus::LoadFailed);
                failed.outcome = e.partial_outcome().cloned();
                failed.with_error(e)
            }
        };
        done.table_existed = ensured.existed;
        done
    }

    /// Probe with the detected encoding, then once with latin1.
    fn probe_with_fallback(
        &self,
        path: &Path,
        detected: TextEncoding,
    ) -> Result<Probe, CsvReadError> {
        match self.probe(path, detected) {
            Err(CsvReadError::Decode(e)) if detected != TextEncoding::Latin1 => {
                warn!(
                    file = %path.display(),
                    encoding = %detected,
                    error = %e,
                    "Probe failed to decode, retrying as latin1"
                );
                self.probe(path, TextEncoding::Latin1)
            }
            other => other,
        }
    }

    fn probe(&self, path: &Path, encoding: TextEncoding) -> Result<Probe, CsvReadError> {
        let delimiter = DialectDetector::detect(path, encoding);
        let mut reader = CsvParser::new()
            .with_delimiter(delimiter)
            .open(path, encoding)?;

        let header = reader.header().to_vec();
        let mut data_rows = 0;
        while data_rows < self.settings.probe_rows {
            match reader.next_row()? {
                Some(RowRead::Row { row, .. }) if !row.shape.is_blank() => data_rows += 1,
                Some(RowRead::Row { .. }) => {}
                Some(RowRead::Skipped { .. }) => {}
                None => break,
            }
        }

        Ok(Probe {
            encoding,
            header,
            data_rows,
        })
    }
}

pub(crate) fn log_connection_failure(err: &SinkError) {
    match err {
        SinkError::Connection { kind, message } => {
            error!(kind = %kind, error = %message, hint = kind.hint(), "Database connection failed");
        }
        other => error!(error = %other, "Database connection failed"),
    }
}
