// In-memory sink used by the engine tests. Uncommitted work lives in a
// working copy of the committed state and disappears on rollback.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::sink::{Sink, SinkConnector};
use crate::domain::csv::{ColumnSchema, RowValues, TableIdentity, DEFAULT_SCHEMA};
use crate::domain::error::{ConnectionFailure, SinkError};

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<RowValues>,
}

#[derive(Debug, Clone)]
struct Catalog {
    schemas: BTreeSet<String>,
    tables: BTreeMap<TableIdentity, MemoryTable>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            schemas: BTreeSet::from([DEFAULT_SCHEMA.to_string()]),
            tables: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    committed: Catalog,
    working: Option<Catalog>,
    commits: usize,
    rollbacks: usize,
    connects: usize,
    closed: bool,
    insert_calls: usize,
    create_table_calls: usize,
    fail_connect: Option<ConnectionFailure>,
    fail_insert_call: Option<usize>,
    fail_create: HashMap<String, SinkError>,
}

impl State {
    fn working(&mut self) -> &mut Catalog {
        let committed = &self.committed;
        self.working.get_or_insert_with(|| committed.clone())
    }
}

/// Cloning shares the underlying state, so a test keeps a handle to
/// inspect what the engine wrote.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<State>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn with_table(self, table: &TableIdentity, columns: &[&str], rows: Vec<RowValues>) -> Self {
        {
            let mut state = self.lock();
            state.committed.schemas.insert(table.schema.clone());
            state.committed.tables.insert(
                table.clone(),
                MemoryTable {
                    columns: ColumnSchema::from_header(columns).names().to_vec(),
                    rows,
                },
            );
        }
        self
    }

    pub fn fail_connect(self, kind: ConnectionFailure) -> Self {
        self.lock().fail_connect = Some(kind);
        self
    }

    /// Fail the `call`-th `insert_rows` call (1-based).
    pub fn fail_insert_call(self, call: usize) -> Self {
        self.lock().fail_insert_call = Some(call);
        self
    }

    /// Fail every `create_table` for `table` with `error`.
    pub fn fail_create(self, table: &str, error: SinkError) -> Self {
        self.lock().fail_create.insert(table.to_string(), error);
        self
    }

    pub fn committed_table(&self, table: &TableIdentity) -> Option<MemoryTable> {
        self.lock().committed.tables.get(table).cloned()
    }

    pub fn committed_rows(&self, table: &TableIdentity) -> Vec<RowValues> {
        self.committed_table(table)
            .map(|t| t.rows)
            .unwrap_or_default()
    }

    pub fn has_schema(&self, schema: &str) -> bool {
        self.lock().committed.schemas.contains(schema)
    }

    pub fn table_count(&self) -> usize {
        self.lock().committed.tables.len()
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn create_table_calls(&self) -> usize {
        self.lock().create_table_calls
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn schema_exists(&mut self, schema: &str) -> Result<bool, SinkError> {
        Ok(self.lock().working().schemas.contains(schema))
    }

    async fn table_exists(&mut self, table: &TableIdentity) -> Result<bool, SinkError> {
        Ok(self.lock().working().tables.contains_key(table))
    }

    async fn create_schema(&mut self, schema: &str) -> Result<(), SinkError> {
        self.lock().working().schemas.insert(schema.to_string());
        Ok(())
    }

    async fn create_table(
        &mut self,
        table: &TableIdentity,
        columns: &ColumnSchema,
    ) -> Result<(), SinkError> {
        let mut state = self.lock();
        state.create_table_calls += 1;
        if let Some(error) = state.fail_create.get(&table.table) {
            return Err(error.clone());
        }

        let catalog = state.working();
        if !catalog.schemas.contains(&table.schema) {
            return Err(SinkError::SchemaMissing(format!(
                "schema \"{}\" does not exist",
                table.schema
            )));
        }
        if catalog.tables.contains_key(table) {
            return Err(SinkError::Statement(format!(
                "relation \"{}\" already exists",
                table
            )));
        }
        catalog.tables.insert(
            table.clone(),
            MemoryTable {
                columns: columns.names().to_vec(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn truncate_table(&mut self, table: &TableIdentity) -> Result<(), SinkError> {
        match self.lock().working().tables.get_mut(table) {
            Some(existing) => {
                existing.rows.clear();
                Ok(())
            }
            None => Err(SinkError::Statement(format!(
                "relation \"{}\" does not exist",
                table
            ))),
        }
    }

    async fn drop_table(&mut self, table: &TableIdentity) -> Result<(), SinkError> {
        self.lock().working().tables.remove(table);
        Ok(())
    }

    async fn insert_rows(
        &mut self,
        table: &TableIdentity,
        columns: &ColumnSchema,
        rows: &[RowValues],
    ) -> Result<u64, SinkError> {
        let mut state = self.lock();
        state.insert_calls += 1;
        if state.fail_insert_call == Some(state.insert_calls) {
            return Err(SinkError::Statement("value too long for type".to_string()));
        }

        let target = state.working().tables.get_mut(table).ok_or_else(|| {
            SinkError::Statement(format!("relation \"{}\" does not exist", table))
        })?;
        if let Some(unknown) = columns.names().iter().find(|c| !target.columns.contains(*c)) {
            return Err(SinkError::Statement(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                unknown, table
            )));
        }
        if rows.iter().any(|row| row.len() != columns.len()) {
            return Err(SinkError::Statement(
                "row arity does not match column list".to_string(),
            ));
        }
        target.rows.extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn commit(&mut self) -> Result<(), SinkError> {
        let mut state = self.lock();
        if let Some(working) = state.working.take() {
            state.committed = working;
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SinkError> {
        let mut state = self.lock();
        state.working = None;
        state.rollbacks += 1;
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.lock();
        state.working = None;
        state.closed = true;
    }
}

#[async_trait]
impl SinkConnector for MemorySink {
    type Sink = MemorySink;

    async fn connect(&self) -> Result<MemorySink, SinkError> {
        let mut state = self.lock();
        if let Some(kind) = state.fail_connect {
            return Err(SinkError::Connection {
                kind,
                message: "connection refused".to_string(),
            });
        }
        state.connects += 1;
        state.closed = false;
        drop(state);
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> RowValues {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[tokio::test]
    async fn test_rollback_discards_uncommitted_rows() {
        let table = TableIdentity::new("public", "t");
        let columns = ColumnSchema::from_header(&["a"]);
        let mut sink = MemorySink::new().with_table(&table, &["a"], Vec::new());

        sink.insert_rows(&table, &columns, &[row(&["1"])]).await.unwrap();
        sink.commit().await.unwrap();
        sink.insert_rows(&table, &columns, &[row(&["2"])]).await.unwrap();
        sink.rollback().await.unwrap();

        assert_eq!(sink.committed_rows(&table), vec![row(&["1"])]);
    }

    #[tokio::test]
    async fn test_insert_rejects_unknown_columns() {
        let table = TableIdentity::new("public", "t");
        let mut sink = MemorySink::new().with_table(&table, &["C_digo"], Vec::new());

        let err = sink
            .insert_rows(&table, &ColumnSchema::from_header(&["C__digo"]), &[row(&["1"])])
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Statement(msg) if msg.contains("C__digo")));
    }

    #[tokio::test]
    async fn test_create_table_requires_schema() {
        let table = TableIdentity::new("staging", "t");
        let columns = ColumnSchema::from_header(&["a"]);
        let mut sink = MemorySink::new();

        let err = sink.create_table(&table, &columns).await.unwrap_err();
        assert!(matches!(err, SinkError::SchemaMissing(_)));
    }
}
