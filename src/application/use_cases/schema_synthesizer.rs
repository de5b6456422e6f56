// ============================================================
// SCHEMA SYNTHESIZER USE CASE
// ============================================================
// Make sure the destination table exists before rows are loaded

use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::csv::{ColumnSchema, TableIdentity};
use crate::domain::error::SinkError;
use crate::infrastructure::db::Sink;

/// Table ready to receive rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEnsured {
    pub table: TableIdentity,
    pub columns: ColumnSchema,
    pub existed: bool,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("header of {table} has no columns")]
    EmptyHeader { table: TableIdentity },

    #[error("failed to look up {table}: {source}")]
    Lookup {
        table: TableIdentity,
        source: SinkError,
    },

    #[error("failed to truncate {table}: {source}")]
    Truncate {
        table: TableIdentity,
        source: SinkError,
    },

    #[error("failed to create {table}: {source}")]
    Create {
        table: TableIdentity,
        source: SinkError,
    },
}

impl SchemaError {
    /// Whether the table was found before the failure.
    pub fn table_existed(&self) -> bool {
        matches!(self, SchemaError::Truncate { .. })
    }
}

pub struct SchemaSynthesizer;

impl SchemaSynthesizer {
    /// Create `table` from `header` if absent, or truncate it when asked to.
    ///
    /// A create that fails because the schema is missing creates the schema
    /// and is retried once. Every statement ends in a commit or a rollback.
    pub async fn ensure_table<S: Sink + ?Sized>(
        sink: &mut S,
        table: &TableIdentity,
        header: &[String],
        truncate_if_exists: bool,
    ) -> Result<TableEnsured, SchemaError> {
        let columns = ColumnSchema::from_header(header);
        if columns.is_empty() {
            return Err(SchemaError::EmptyHeader {
                table: table.clone(),
            });
        }

        let existed = match sink.table_exists(table).await {
            Ok(existed) => existed,
            Err(source) => {
                rollback_quietly(sink).await;
                return Err(SchemaError::Lookup {
                    table: table.clone(),
                    source,
                });
            }
        };

        if existed {
            if truncate_if_exists {
                let truncated = match sink.truncate_table(table).await {
                    Ok(()) => sink.commit().await,
                    Err(e) => Err(e),
                };
                if let Err(source) = truncated {
                    error!(table = %table, error = %source, "Failed to truncate table");
                    rollback_quietly(sink).await;
                    return Err(SchemaError::Truncate {
                        table: table.clone(),
                        source,
                    });
                }
                info!(table = %table, "Existing table truncated");
            } else {
                // Close the catalog lookup
                if let Err(source) = sink.commit().await {
                    rollback_quietly(sink).await;
                    return Err(SchemaError::Lookup {
                        table: table.clone(),
                        source,
                    });
                }
                info!(table = %table, "Table already exists, appending");
            }

            return Ok(TableEnsured {
                table: table.clone(),
                columns,
                existed: true,
            });
        }

        let created = match create_committed(sink, table, &columns).await {
            Err(SinkError::SchemaMissing(message)) => {
                warn!(
                    table = %table,
                    schema = %table.schema,
                    error = %message,
                    "Schema missing, creating it and retrying"
                );
                rollback_quietly(sink).await;
                match ensure_schema(sink, &table.schema).await {
                    Ok(()) => create_committed(sink, table, &columns).await,
                    Err(e) => Err(e),
                }
            }
            other => other,
        };

        if let Err(source) = created {
            error!(table = %table, error = %source, "Failed to create table");
            rollback_quietly(sink).await;
            return Err(SchemaError::Create {
                table: table.clone(),
                source,
            });
        }

        info!(table = %table, columns = columns.len(), "Table created");
        Ok(TableEnsured {
            table: table.clone(),
            columns,
            existed: false,
        })
    }
}

async fn create_committed<S: Sink + ?Sized>(
    sink: &mut S,
    table: &TableIdentity,
    columns: &ColumnSchema,
) -> Result<(), SinkError> {
    sink.create_table(table, columns).await?;
    sink.commit().await
}

async fn ensure_schema<S: Sink + ?Sized>(sink: &mut S, schema: &str) -> Result<(), SinkError> {
    if !sink.schema_exists(schema).await? {
        sink.create_schema(schema).await?;
        info!(schema = %schema, "Schema created");
    }
    sink.commit().await
}

pub(crate) async fn rollback_quietly<S: Sink + ?Sized>(sink: &mut S) {
    if let Err(e) = sink.rollback().await {
        warn!(error = %e, "Rollback failed");
    }
}
