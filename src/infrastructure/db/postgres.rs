use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};
use tracing::{debug, info};

use super::sink::{Sink, SinkConnector};
use crate::domain::csv::{quote_identifier, ColumnSchema, RowValues, TableIdentity};
use crate::domain::error::{ConnectionFailure, SinkError};
use crate::infrastructure::config::DatabaseConfig;

/// PostgreSQL caps a statement at 65 535 bind parameters
const MAX_BIND_PARAMS: usize = 65_535;

const SQLSTATE_INVALID_SCHEMA: &str = "3F000";
const SQLSTATE_INVALID_PASSWORD: &str = "28P01";
const SQLSTATE_INVALID_AUTHORIZATION: &str = "28000";
const SQLSTATE_INVALID_CATALOG: &str = "3D000";

pub struct PgConnector {
    options: PgConnectOptions,
    config: DatabaseConfig,
}

impl PgConnector {
    pub fn new(config: &DatabaseConfig) -> Self {
        // `new()` picks up PG* environment variables and .pgpass
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.name);

        if !config.use_trusted() {
            if let (Some(user), Some(password)) = (&config.user, &config.password) {
                options = options.username(user).password(password);
            }
        }

        Self {
            options,
            config: config.clone(),
        }
    }
}

#[async_trait]
impl SinkConnector for PgConnector {
    type Sink = PgSink;

    async fn connect(&self) -> Result<PgSink, SinkError> {
        info!(
            host = %self.config.host,
            port = self.config.port,
            database = %self.config.name,
            trusted = self.config.use_trusted(),
            "Connecting to PostgreSQL"
        );

        // One connection: every statement of a run shares the same session
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.config.connect_timeout())
            .connect_with(self.options.clone())
            .await
            .map_err(connection_error)?;

        info!(database = %self.config.name, "Connected");
        Ok(PgSink { pool, tx: None })
    }
}

pub struct PgSink {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSink {
    async fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, SinkError> {
        if self.tx.is_none() {
            let tx = self.pool.begin().await.map_err(statement_error)?;
            self.tx = Some(tx);
        }
        self.tx
            .as_mut()
            .ok_or_else(|| SinkError::Statement("no open transaction".to_string()))
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, SinkError> {
        debug!(sql = %sql, "Executing statement");
        let tx = self.tx().await?;
        let result = sqlx::query(sql)
            .execute(&mut **tx)
            .await
            .map_err(statement_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Sink for PgSink {
    async fn schema_exists(&mut self, schema: &str) -> Result<bool, SinkError> {
        let tx = self.tx().await?;
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname = $1)",
        )
        .bind(schema)
        .fetch_one(&mut **tx)
        .await
        .map_err(statement_error)
    }

    async fn table_exists(&mut self, table: &TableIdentity) -> Result<bool, SinkError> {
        let tx = self.tx().await?;
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )",
        )
        .bind(&table.schema)
        .bind(&table.table)
        .fetch_one(&mut **tx)
        .await
        .map_err(statement_error)
    }

    async fn create_schema(&mut self, schema: &str) -> Result<(), SinkError> {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_identifier(schema));
        self.execute(&sql).await.map(|_| ())
    }

    async fn create_table(
        &mut self,
        table: &TableIdentity,
        columns: &ColumnSchema,
    ) -> Result<(), SinkError> {
        let sql = format!(
            "CREATE TABLE {} ({})",
            table.qualified(),
            columns.column_definitions()
        );
        self.execute(&sql).await.map(|_| ())
    }

    async fn truncate_table(&mut self, table: &TableIdentity) -> Result<(), SinkError> {
        let sql = format!("TRUNCATE TABLE {}", table.qualified());
        self.execute(&sql).await.map(|_| ())
    }

    async fn drop_table(&mut self, table: &TableIdentity) -> Result<(), SinkError> {
        let sql = format!("DROP TABLE IF EXISTS {}", table.qualified());
        self.execute(&sql).await.map(|_| ())
    }

    async fn insert_rows(
        &mut self,
        table: &TableIdentity,
        columns: &ColumnSchema,
        rows: &[RowValues],
    ) -> Result<u64, SinkError> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(0);
        }

        let rows_per_statement = (MAX_BIND_PARAMS / columns.len()).max(1);
        let prefix = format!(
            "INSERT INTO {} ({}) ",
            table.qualified(),
            columns.quoted_list()
        );

        let tx = self.tx().await?;
        let mut inserted = 0;
        for slice in rows.chunks(rows_per_statement) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(prefix.as_str());
            builder.push_values(slice, |mut values, row| {
                for value in row {
                    values.push_bind(value.as_deref());
                }
            });

            let result = builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(statement_error)?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    async fn commit(&mut self) -> Result<(), SinkError> {
        match self.tx.take() {
            Some(tx) => tx.commit().await.map_err(statement_error),
            None => Ok(()),
        }
    }

    async fn rollback(&mut self) -> Result<(), SinkError> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(statement_error),
            None => Ok(()),
        }
    }

    async fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            if let Err(e) = tx.rollback().await {
                debug!(error = %e, "Rollback on close failed");
            }
        }
        self.pool.close().await;
        info!("Database connection closed");
    }
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
}

fn statement_error(err: sqlx::Error) -> SinkError {
    match sqlstate(&err).as_deref() {
        Some(SQLSTATE_INVALID_SCHEMA) => SinkError::SchemaMissing(err.to_string()),
        _ => SinkError::Statement(err.to_string()),
    }
}

fn connection_error(err: sqlx::Error) -> SinkError {
    let kind = match sqlstate(&err).as_deref() {
        Some(SQLSTATE_INVALID_PASSWORD) | Some(SQLSTATE_INVALID_AUTHORIZATION) => {
            ConnectionFailure::Authentication
        }
        Some(SQLSTATE_INVALID_CATALOG) => ConnectionFailure::MissingDatabase,
        Some(_) => ConnectionFailure::Other,
        None => match err {
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
                ConnectionFailure::Network
            }
            _ => ConnectionFailure::Other,
        },
    };

    SinkError::Connection {
        kind,
        message: err.to_string(),
    }
}
