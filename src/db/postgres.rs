//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient`
//! trait using sqlx. Cursors are backed by a spawned fetch task feeding a
//! bounded channel, so memory stays bounded by the chunk size no matter how
//! large the result set is.

use crate::config::ConnectionConfig;
use crate::db::{ColumnInfo, DatabaseClient, QueryResult, Row, RowCursor, Value};
use crate::error::{ExportError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, TypeInfo};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

/// Rows buffered between the fetch task and the cursor consumer.
const CURSOR_BUFFER_ROWS: usize = 1024;

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Connects to the database described by `config`.
    ///
    /// A single attempt: connectivity failures are surfaced immediately and
    /// never retried. Restarting a failed export is the caller's decision.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;
        debug!("Connecting to database");

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&conn_str)
            .await
            .map_err(|e| map_connection_error(e, config))?;

        debug!("Successfully connected to database");
        Ok(Self { pool })
    }

    /// Creates a new PostgresClient from an existing connection pool.
    ///
    /// This is primarily useful for testing.
    #[allow(dead_code)]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns column metadata for a query without executing it.
    async fn describe_columns(&self, sql: &str) -> Result<Vec<ColumnInfo>> {
        let describe = self
            .pool
            .describe(sql)
            .await
            .map_err(|e| ExportError::query(format_query_error(e)))?;

        Ok(describe
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
            .collect())
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();

        let result = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ExportError::query(format_query_error(e)))?;

        let execution_time = start.elapsed();

        // Column metadata comes from the first row if available; an empty
        // result still needs columns so the header row can be written.
        let columns: Vec<ColumnInfo> = if let Some(first_row) = result.first() {
            first_row
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect()
        } else {
            self.describe_columns(sql).await.unwrap_or_default()
        };

        let rows: Vec<Row> = result.iter().map(convert_row).collect();

        Ok(QueryResult {
            columns,
            rows,
            execution_time,
        })
    }

    async fn open_cursor(&self, sql: &str) -> Result<Box<dyn RowCursor>> {
        let columns = self.describe_columns(sql).await?;

        let (tx, rx) = mpsc::channel::<Result<Row>>(CURSOR_BUFFER_ROWS);
        let pool = self.pool.clone();
        let sql = sql.to_string();

        tokio::spawn(async move {
            let mut stream = sqlx::query(&sql).fetch(&pool);
            while let Some(item) = stream.next().await {
                let message = match item {
                    Ok(row) => Ok(convert_row(&row)),
                    Err(e) => Err(ExportError::query(format_query_error(e))),
                };
                let failed = message.is_err();
                if tx.send(message).await.is_err() || failed {
                    // Receiver dropped or the query failed; stop pulling.
                    break;
                }
            }
        });

        Ok(Box::new(PgCursor { columns, rx }))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Cursor over a single streamed query execution.
struct PgCursor {
    columns: Vec<ColumnInfo>,
    rx: mpsc::Receiver<Result<Row>>,
}

#[async_trait]
impl RowCursor for PgCursor {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    async fn fetch(&mut self, max_rows: usize) -> Result<Vec<Row>> {
        let mut rows = Vec::with_capacity(max_rows.min(CURSOR_BUFFER_ROWS));
        while rows.len() < max_rows {
            match self.rx.recv().await {
                Some(Ok(row)) => rows.push(row),
                Some(Err(e)) => return Err(e),
                None => break, // Fetch task finished; cursor exhausted.
            }
        }
        Ok(rows)
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(|bytes| {
                Value::String(bytes.iter().map(|b| format!("{b:02x}")).collect())
            })
            .unwrap_or(Value::Null),

        // For all other types, try to get as string
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> ExportError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        ExportError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        ExportError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        ExportError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        ExportError::connection(
            "Server requires SSL. Add '?sslmode=require' to connection string.".to_string(),
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        ExportError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        ExportError::connection(error.to_string())
    }
}

/// Formats a query error with detail and hints if available.
fn format_query_error(error: sqlx::Error) -> String {
    let error_str = error.to_string();

    let mut result = String::new();

    if let Some(db_error) = error.as_database_error() {
        result.push_str("ERROR: ");
        result.push_str(db_error.message());

        if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
            if let Some(detail) = pg_error.detail() {
                result.push_str("\n  DETAIL: ");
                result.push_str(detail);
            }

            if let Some(hint) = pg_error.hint() {
                result.push_str("\n  HINT: ");
                result.push_str(hint);
            }
        }
    } else {
        result = error_str;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseBackend;

    // Note: These tests require a running PostgreSQL database.
    // They are skipped unless DATABASE_URL is set.

    async fn get_test_client() -> Option<PostgresClient> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let config = ConnectionConfig::from_connection_string(&url).ok()?;
        PostgresClient::connect(&config).await.ok()
    }

    #[tokio::test]
    async fn test_execute_select_query() {
        let Some(client) = get_test_client().await else {
            eprintln!("Skipping test: DATABASE_URL not set");
            return;
        };

        let result = client
            .execute_query("SELECT 1 as num, 'hello' as greeting")
            .await
            .unwrap();

        assert_eq!(result.columns.len(), 2);
        assert_eq!(result.columns[0].name, "num");
        assert_eq!(result.columns[1].name, "greeting");
        assert_eq!(result.rows.len(), 1);

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_result_still_has_columns() {
        let Some(client) = get_test_client().await else {
            eprintln!("Skipping test: DATABASE_URL not set");
            return;
        };

        let result = client
            .execute_query("SELECT 1 as num WHERE false")
            .await
            .unwrap();

        assert!(result.rows.is_empty());
        assert_eq!(result.columns.len(), 1);
        assert_eq!(result.columns[0].name, "num");

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_cursor_fetch_in_chunks() {
        let Some(client) = get_test_client().await else {
            eprintln!("Skipping test: DATABASE_URL not set");
            return;
        };

        let mut cursor = client
            .open_cursor("SELECT generate_series(1, 25) AS n")
            .await
            .unwrap();

        assert_eq!(cursor.columns().len(), 1);

        let first = cursor.fetch(10).await.unwrap();
        assert_eq!(first.len(), 10);
        let second = cursor.fetch(10).await.unwrap();
        assert_eq!(second.len(), 10);
        let third = cursor.fetch(10).await.unwrap();
        assert_eq!(third.len(), 5);
        let exhausted = cursor.fetch(10).await.unwrap();
        assert!(exhausted.is_empty());

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_query_with_error() {
        let Some(client) = get_test_client().await else {
            eprintln!("Skipping test: DATABASE_URL not set");
            return;
        };

        let result = client
            .execute_query("SELECT * FROM nonexistent_table_xyz")
            .await;
        assert!(result.is_err());

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_error_messages() {
        let config = ConnectionConfig {
            backend: DatabaseBackend::Postgres,
            host: Some("nonexistent.invalid.host".to_string()),
            port: 5432,
            database: Some("testdb".to_string()),
            user: Some("testuser".to_string()),
            password: Some("testpass".to_string()),
        };

        let result = PostgresClient::connect(&config).await;
        assert!(result.is_err());
        let error = result.unwrap_err();
        assert!(matches!(error, ExportError::Connection(_)));
    }
}
