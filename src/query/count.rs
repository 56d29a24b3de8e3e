//! Result counting.
//!
//! The total row count is learned up front: progress needs a denominator and
//! paged fetching needs a termination condition. Failure here is fatal to
//! the export and is surfaced, not retried.

use crate::db::{DatabaseClient, Value};
use crate::error::{ExportError, Result};

/// Executes a count query wrapping `sql` as a subquery and returns the total.
///
/// The caller passes the normalized (and, for paged mode, ordered) query.
/// If the data set changes between this count and a later page there is no
/// snapshot isolation; the exporter trusts this count.
pub async fn count_rows(client: &dyn DatabaseClient, sql: &str) -> Result<u64> {
    let count_query = format!("SELECT COUNT(*) FROM ({sql}) AS _rowbook_count");
    let result = client.execute_query(&count_query).await?;

    let value = result
        .rows
        .first()
        .and_then(|row| row.first())
        .ok_or_else(|| ExportError::query("Count query returned no rows"))?;

    match value {
        Value::Int(n) if *n >= 0 => Ok(*n as u64),
        Value::Float(f) if *f >= 0.0 => Ok(*f as u64),
        Value::String(s) => s
            .parse::<u64>()
            .map_err(|_| ExportError::query(format!("Count query returned non-numeric value '{s}'"))),
        other => Err(ExportError::query(format!(
            "Count query returned unexpected value {other}"
        ))),
    }
}
