//! Database abstraction layer for rowbook.
//!
//! Provides a trait-based interface for the read-only operations the
//! exporter needs, allowing different database backends to be used
//! interchangeably and tests to run against an in-memory mock.

mod mock;
mod postgres;
mod types;

pub use mock::{FailingDatabaseClient, MockDatabaseClient};
pub use postgres::PostgresClient;
pub use types::{same_schema, ColumnInfo, QueryResult, Row, Value};

use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    // Future: MySQL, SQLite, etc.
}

impl DatabaseBackend {
    /// Returns the backend as a string for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// Returns the default port for this backend.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Postgres => 5432,
        }
    }
}

/// Creates a database client for the given backend and configuration.
///
/// This is the central factory function for database connections. Each
/// export operation should hold its own client (or borrow one under the
/// single-operation-at-a-time constraint documented on [`DatabaseClient`]).
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn DatabaseClient>> {
    match config.backend {
        DatabaseBackend::Postgres => {
            let client = PostgresClient::connect(config).await?;
            Ok(Box::new(client))
        }
    }
}

/// Trait defining the read-only interface for database clients.
///
/// The exporter never issues writes. A single client may be shared between
/// sequential export operations, but concurrent exports must each use their
/// own client: nothing here serializes access to the underlying connection.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Executes a SQL query and returns the complete result set.
    ///
    /// Used for count queries, ordering probes, and individual pages; the
    /// caller is responsible for bounding the result via the query text.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Executes a SQL query once and returns a cursor over its rows.
    ///
    /// Column metadata is available immediately, even for a query that
    /// yields zero rows.
    async fn open_cursor(&self, sql: &str) -> Result<Box<dyn RowCursor>>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}

/// A forward-only cursor over a single query execution.
#[async_trait]
pub trait RowCursor: Send {
    /// Column metadata for the cursor's result set.
    fn columns(&self) -> &[ColumnInfo];

    /// Fetches up to `max_rows` rows. An empty vector signals exhaustion.
    async fn fetch(&mut self, max_rows: usize) -> Result<Vec<Row>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!(DatabaseBackend::parse("postgres"), Some(DatabaseBackend::Postgres));
        assert_eq!(DatabaseBackend::parse("PostgreSQL"), Some(DatabaseBackend::Postgres));
        assert_eq!(DatabaseBackend::parse("oracle"), None);
    }

    #[test]
    fn test_backend_defaults() {
        let backend = DatabaseBackend::default();
        assert_eq!(backend.as_str(), "postgres");
        assert_eq!(backend.default_port(), 5432);
    }
}
