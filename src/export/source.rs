//! Row batch sources.
//!
//! Two fetch strategies behind one trait: `PagedSource` re-executes the
//! query with a growing offset window, `StreamSource` pulls bounded chunks
//! from a single long-lived cursor. Both establish their column schema at
//! open time so a zero-row result still produces a header, and both keep
//! memory bounded by the page/chunk size.

use crate::db::{same_schema, ColumnInfo, DatabaseClient, QueryResult, Row, RowCursor};
use crate::error::{ExportError, Result};
use async_trait::async_trait;
use tracing::debug;

/// One fetched batch of rows. `done` with an empty batch signals exhaustion.
#[derive(Debug, Default)]
pub struct RowBatch {
    pub rows: Vec<Row>,
    pub done: bool,
}

/// Common contract for the two fetch strategies.
#[async_trait]
pub trait RowBatchSource: Send {
    /// Column schema, fixed for the lifetime of the source.
    fn schema(&self) -> &[ColumnInfo];

    /// Fetches the next batch. Must not be called again after a batch with
    /// `done == true` has been returned.
    async fn next_batch(&mut self) -> Result<RowBatch>;
}

/// Offset-paginated source.
///
/// Re-executes `<query> LIMIT page_size OFFSET n` for each batch and trusts
/// the row count taken before the first page: if the underlying data changes
/// mid-export there is no snapshot isolation and the drift goes undetected.
/// The query must carry a deterministic ordering (see the ordering guard).
pub struct PagedSource<'a> {
    client: &'a dyn DatabaseClient,
    sql: String,
    page_size: usize,
    total: u64,
    offset: u64,
    schema: Vec<ColumnInfo>,
    first_page: Option<Vec<Row>>,
}

impl<'a> PagedSource<'a> {
    /// Opens the source, eagerly fetching the first page to establish the
    /// schema before any row is consumed.
    pub async fn open(
        client: &'a dyn DatabaseClient,
        sql: &str,
        page_size: usize,
        total: u64,
    ) -> Result<PagedSource<'a>> {
        if page_size == 0 {
            return Err(ExportError::internal("page_size must be positive"));
        }

        let page = fetch_page(client, sql, page_size, 0).await?;
        if page.columns.is_empty() {
            return Err(ExportError::query("Query returned no column metadata"));
        }

        Ok(Self {
            client,
            sql: sql.to_string(),
            page_size,
            total,
            offset: page_size as u64,
            schema: page.columns,
            first_page: Some(page.rows),
        })
    }

    /// The offset the next page would be fetched at.
    pub fn current_offset(&self) -> u64 {
        self.offset
    }
}

#[async_trait]
impl RowBatchSource for PagedSource<'_> {
    fn schema(&self) -> &[ColumnInfo] {
        &self.schema
    }

    async fn next_batch(&mut self) -> Result<RowBatch> {
        if let Some(rows) = self.first_page.take() {
            return Ok(RowBatch {
                rows,
                done: self.offset >= self.total,
            });
        }

        if self.offset >= self.total {
            return Ok(RowBatch {
                rows: Vec::new(),
                done: true,
            });
        }

        let page = fetch_page(self.client, &self.sql, self.page_size, self.offset).await?;

        if !same_schema(&page.columns, &self.schema) {
            return Err(ExportError::query(format!(
                "Schema changed between pages: expected [{}], got [{}]",
                column_names(&self.schema),
                column_names(&page.columns)
            )));
        }

        self.offset += self.page_size as u64;
        Ok(RowBatch {
            rows: page.rows,
            done: self.offset >= self.total,
        })
    }
}

async fn fetch_page(
    client: &dyn DatabaseClient,
    sql: &str,
    page_size: usize,
    offset: u64,
) -> Result<QueryResult> {
    let paginated = format!("{sql} LIMIT {page_size} OFFSET {offset}");
    debug!(offset, "Fetching page");
    client.execute_query(&paginated).await
}

fn column_names(columns: &[ColumnInfo]) -> String {
    columns
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Single-cursor streaming source.
///
/// Executes the query once and pulls fixed-size chunks until a chunk comes
/// back short or empty. No offset bookkeeping; the preferred default since
/// it avoids re-executing the query per window.
pub struct StreamSource {
    cursor: Box<dyn RowCursor>,
    chunk_size: usize,
    schema: Vec<ColumnInfo>,
    finished: bool,
}

impl StreamSource {
    /// Opens a cursor over `sql` and captures its column schema.
    pub async fn open(
        client: &dyn DatabaseClient,
        sql: &str,
        chunk_size: usize,
    ) -> Result<StreamSource> {
        if chunk_size == 0 {
            return Err(ExportError::internal("chunk_size must be positive"));
        }

        let cursor = client.open_cursor(sql).await?;
        let schema = cursor.columns().to_vec();
        if schema.is_empty() {
            return Err(ExportError::query("Query returned no column metadata"));
        }

        Ok(Self {
            cursor,
            chunk_size,
            schema,
            finished: false,
        })
    }
}

#[async_trait]
impl RowBatchSource for StreamSource {
    fn schema(&self) -> &[ColumnInfo] {
        &self.schema
    }

    async fn next_batch(&mut self) -> Result<RowBatch> {
        if self.finished {
            return Ok(RowBatch {
                rows: Vec::new(),
                done: true,
            });
        }

        let rows = self.cursor.fetch(self.chunk_size).await?;
        let done = rows.len() < self.chunk_size;
        self.finished = done;

        Ok(RowBatch { rows, done })
    }
}
