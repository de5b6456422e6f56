use async_trait::async_trait;

use crate::domain::csv::{ColumnSchema, RowValues, TableIdentity};
use crate::domain::error::SinkError;

/// Relational destination for loaded rows.
///
/// Every statement joins the sink's current transaction, opening one if none
/// is active; `commit` and `rollback` end it.
#[async_trait]
pub trait Sink: Send {
    async fn schema_exists(&mut self, schema: &str) -> Result<bool, SinkError>;

    async fn table_exists(&mut self, table: &TableIdentity) -> Result<bool, SinkError>;

    /// Create `schema` unless it already exists.
    async fn create_schema(&mut self, schema: &str) -> Result<(), SinkError>;

    /// Create `table` with every column typed as unbounded text.
    async fn create_table(
        &mut self,
        table: &TableIdentity,
        columns: &ColumnSchema,
    ) -> Result<(), SinkError>;

    async fn truncate_table(&mut self, table: &TableIdentity) -> Result<(), SinkError>;

    /// Drop `table` if present.
    async fn drop_table(&mut self, table: &TableIdentity) -> Result<(), SinkError>;

    /// Insert `rows` in column order; returns the number of rows written.
    async fn insert_rows(
        &mut self,
        table: &TableIdentity,
        columns: &ColumnSchema,
        rows: &[RowValues],
    ) -> Result<u64, SinkError>;

    async fn commit(&mut self) -> Result<(), SinkError>;

    async fn rollback(&mut self) -> Result<(), SinkError>;

    /// Release the connection, discarding any uncommitted work.
    async fn close(&mut self);
}

/// Opens a [`Sink`] for one run.
#[async_trait]
pub trait SinkConnector: Sync {
    type Sink: Sink;

    async fn connect(&self) -> Result<Self::Sink, SinkError>;
}
