// ============================================================
// TABLE DROPPER USE CASE
// ============================================================
// Remove the tables an ingestion run would have created for a directory

use std::path::Path;

use tracing::{error, info, warn};

use super::ingestion::{log_connection_failure, IngestError};
use super::schema_synthesizer::rollback_quietly;
use crate::domain::csv::{DropSummary, SourceFile, TableIdentity};
use crate::infrastructure::csv::discover_csv_files;
use crate::infrastructure::db::{Sink, SinkConnector};

pub struct TableDropper {
    schema: String,
    dry_run: bool,
}

impl TableDropper {
    pub fn new(schema: &str, dry_run: bool) -> Self {
        Self {
            schema: schema.to_string(),
            dry_run,
        }
    }

    /// Tables derived from the `*.csv` files in `source_dir`, in file order.
    pub fn targets(&self, source_dir: &Path) -> Result<Vec<TableIdentity>, IngestError> {
        if !source_dir.is_dir() {
            return Err(IngestError::MissingDirectory(source_dir.to_path_buf()));
        }
        let mut targets: Vec<TableIdentity> = Vec::new();
        for path in discover_csv_files(source_dir)? {
            let table = TableIdentity::for_source(&self.schema, &SourceFile::from_path(&path));
            if !targets.contains(&table) {
                targets.push(table);
            }
        }
        Ok(targets)
    }

    /// Drop every target table. In dry-run mode only existence is checked.
    pub async fn run<C: SinkConnector>(
        &self,
        source_dir: &Path,
        connector: &C,
    ) -> Result<DropSummary, IngestError> {
        if self.schema.trim().is_empty() {
            return Err(IngestError::Settings("schema must not be empty".to_string()));
        }
        let targets = self.targets(source_dir)?;

        let mut summary = DropSummary {
            dry_run: self.dry_run,
            planned: targets.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        };
        if targets.is_empty() {
            warn!(dir = %source_dir.display(), "No CSV files found, nothing to drop");
            return Ok(summary);
        }

        let mut sink = connector.connect().await.map_err(|e| {
            log_connection_failure(&e);
            IngestError::Connection(e)
        })?;

        for table in &targets {
            self.drop_one(&mut sink, table, &mut summary).await;
        }
        sink.close().await;

        info!(
            dry_run = self.dry_run,
            planned = summary.planned.len(),
            dropped = summary.dropped.len(),
            missing = summary.missing.len(),
            failed = summary.failed.len(),
            "Drop finished"
        );
        Ok(summary)
    }

    async fn drop_one<S: Sink + ?Sized>(
        &self,
        sink: &mut S,
        table: &TableIdentity,
        summary: &mut DropSummary,
    ) {
        let exists = match sink.table_exists(table).await {
            Ok(exists) => exists,
            Err(e) => {
                error!(table = %table, error = %e, "Failed to look up table");
                rollback_quietly(sink).await;
                summary.failed.push(table.to_string());
                return;
            }
        };

        if !exists {
            info!(table = %table, "Table does not exist");
            rollback_quietly(sink).await;
            summary.missing.push(table.to_string());
            return;
        }

        if self.dry_run {
            info!(table = %table, "[dry-run] Would drop table");
            rollback_quietly(sink).await;
            return;
        }

        let dropped = match sink.drop_table(table).await {
            Ok(()) => sink.commit().await,
            Err(e) => Err(e),
        };
        match dropped {
            Ok(()) => {
                info!(table = %table, "Table dropped");
                summary.dropped.push(table.to_string());
            }
            Err(e) => {
                error!(table = %table, error = %e, "Failed to drop table");
                rollback_quietly(sink).await;
                summary.failed.push(table.to_string());
            }
        }
    }
}
