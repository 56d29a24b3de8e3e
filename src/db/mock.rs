//! Mock database clients for testing.
//!
//! `MockDatabaseClient` serves a fixed in-memory dataset and interprets just
//! enough SQL (count wrappers, `LIMIT`/`OFFSET` windows) for the exporter's
//! query shapes. It records every statement it sees so tests can assert how
//! many fetches an export issued and what SQL actually ran.

use super::{ColumnInfo, DatabaseClient, QueryResult, Row, RowCursor, Value};
use crate::error::{ExportError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// A mock database client backed by a fixed dataset.
pub struct MockDatabaseClient {
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
    executed: Mutex<Vec<String>>,
    /// When set, offset-paginated fetches past offset zero report a renamed
    /// first column, simulating schema drift between pages.
    drift_on_later_pages: bool,
}

impl MockDatabaseClient {
    /// Creates a mock client with a small default dataset.
    pub fn new() -> Self {
        let columns = vec![
            ColumnInfo::new("id", "int8"),
            ColumnInfo::new("name", "text"),
        ];
        let rows = vec![
            vec![Value::Int(1), Value::String("Alice".to_string())],
            vec![Value::Int(2), Value::String("Bob".to_string())],
        ];
        Self::with_data(columns, rows)
    }

    /// Creates a mock client serving the given columns and rows.
    pub fn with_data(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            executed: Mutex::new(Vec::new()),
            drift_on_later_pages: false,
        }
    }

    /// Makes every page after the first report a different column name.
    pub fn with_schema_drift(mut self) -> Self {
        self.drift_on_later_pages = true;
        self
    }

    /// Returns every statement executed so far, in order.
    pub fn executed_queries(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn record(&self, sql: &str) {
        self.executed.lock().unwrap().push(sql.to_string());
    }

    fn columns_for_offset(&self, offset: usize) -> Vec<ColumnInfo> {
        if self.drift_on_later_pages && offset > 0 {
            let mut drifted = self.columns.clone();
            if let Some(first) = drifted.first_mut() {
                first.name = format!("{}_drifted", first.name);
            }
            drifted
        } else {
            self.columns.clone()
        }
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.record(sql);
        let upper = sql.trim().to_uppercase();

        if upper.starts_with("SELECT COUNT(*)") {
            return Ok(QueryResult {
                columns: vec![ColumnInfo::new("count", "int8")],
                rows: vec![vec![Value::Int(self.rows.len() as i64)]],
                execution_time: Duration::from_millis(1),
            });
        }

        let (limit, offset) = parse_window(sql);
        let rows: Vec<Row> = self
            .rows
            .iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(QueryResult {
            columns: self.columns_for_offset(offset),
            rows,
            execution_time: Duration::from_millis(1),
        })
    }

    async fn open_cursor(&self, sql: &str) -> Result<Box<dyn RowCursor>> {
        self.record(sql);
        Ok(Box::new(MockCursor {
            columns: self.columns.clone(),
            remaining: self.rows.iter().cloned().collect(),
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Extracts `LIMIT n [OFFSET m]` from a statement, if present.
fn parse_window(sql: &str) -> (Option<usize>, usize) {
    let re = Regex::new(r"(?i)\bLIMIT\s+(\d+)(?:\s+OFFSET\s+(\d+))?").unwrap();
    match re.captures(sql) {
        Some(caps) => {
            let limit = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let offset = caps
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            (limit, offset)
        }
        None => (None, 0),
    }
}

/// Cursor over the mock's dataset.
struct MockCursor {
    columns: Vec<ColumnInfo>,
    remaining: VecDeque<Row>,
}

#[async_trait]
impl RowCursor for MockCursor {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    async fn fetch(&mut self, max_rows: usize) -> Result<Vec<Row>> {
        let take = max_rows.min(self.remaining.len());
        Ok(self.remaining.drain(..take).collect())
    }
}

/// A client whose every operation fails, for exercising error paths.
pub struct FailingDatabaseClient;

#[async_trait]
impl DatabaseClient for FailingDatabaseClient {
    async fn execute_query(&self, _sql: &str) -> Result<QueryResult> {
        Err(ExportError::query("mock failure: execute_query"))
    }

    async fn open_cursor(&self, _sql: &str) -> Result<Box<dyn RowCursor>> {
        Err(ExportError::query("mock failure: open_cursor"))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
