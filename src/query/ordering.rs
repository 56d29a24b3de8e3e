//! Ordering guard for paged exports.
//!
//! Re-issuing the same query with different offsets only partitions the
//! result cleanly when the underlying order is deterministic; without an
//! `ORDER BY`, rows can repeat or vanish across pages. The guard appends a
//! positional sort over every column when the query lacks one.

use crate::db::DatabaseClient;
use crate::error::{ExportError, Result};
use tracing::debug;

/// A query that is guaranteed to carry an explicit ordering clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedQuery {
    /// The SQL that will actually execute.
    pub sql: String,

    /// True when the guard appended an ordering clause; the caller should
    /// surface this to the user since the executing text differs from what
    /// they typed.
    pub rewritten: bool,
}

/// Ensures `sql` has a deterministic ordering.
///
/// If the text already contains an ordering clause (case-insensitive), it is
/// returned untouched. Otherwise a single `LIMIT 1` probe learns the column
/// count and `ORDER BY 1, 2, …, N` is appended. Only paged exports need
/// this; a single streamed cursor produces the whole result in one
/// execution.
pub async fn ensure_ordered(client: &dyn DatabaseClient, sql: &str) -> Result<OrderedQuery> {
    if sql.to_uppercase().contains("ORDER BY") {
        return Ok(OrderedQuery {
            sql: sql.to_string(),
            rewritten: false,
        });
    }

    let probe = format!("{sql} LIMIT 1");
    debug!("Probing column count for ordering guard");
    let result = client.execute_query(&probe).await?;

    let column_count = result.columns.len();
    if column_count == 0 {
        return Err(ExportError::query(
            "Ordering probe returned no column metadata",
        ));
    }

    let positions: Vec<String> = (1..=column_count).map(|i| i.to_string()).collect();
    let ordered = format!("{sql} ORDER BY {}", positions.join(", "));

    Ok(OrderedQuery {
        sql: ordered,
        rewritten: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnInfo, MockDatabaseClient, Value};

    fn three_column_client() -> MockDatabaseClient {
        MockDatabaseClient::with_data(
            vec![
                ColumnInfo::new("a", "int8"),
                ColumnInfo::new("b", "text"),
                ColumnInfo::new("c", "float8"),
            ],
            vec![vec![Value::Int(1), Value::from("x"), Value::Float(1.0)]],
        )
    }

    #[tokio::test]
    async fn test_appends_positional_ordering() {
        let client = three_column_client();
        let ordered = ensure_ordered(&client, "SELECT a, b, c FROM t").await.unwrap();

        assert!(ordered.rewritten);
        assert_eq!(ordered.sql, "SELECT a, b, c FROM t ORDER BY 1, 2, 3");
    }

    #[tokio::test]
    async fn test_probe_uses_limit_one() {
        let client = three_column_client();
        ensure_ordered(&client, "SELECT a, b, c FROM t").await.unwrap();

        let executed = client.executed_queries();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0], "SELECT a, b, c FROM t LIMIT 1");
    }

    #[tokio::test]
    async fn test_existing_ordering_untouched() {
        let client = three_column_client();
        let ordered = ensure_ordered(&client, "SELECT a FROM t ORDER BY a DESC")
            .await
            .unwrap();

        assert!(!ordered.rewritten);
        assert_eq!(ordered.sql, "SELECT a FROM t ORDER BY a DESC");
        // No probe should have been issued.
        assert!(client.executed_queries().is_empty());
    }

    #[tokio::test]
    async fn test_detection_is_case_insensitive() {
        let client = three_column_client();
        let ordered = ensure_ordered(&client, "select a from t order by 1")
            .await
            .unwrap();
        assert!(!ordered.rewritten);
    }

    #[tokio::test]
    async fn test_probe_failure_is_fatal() {
        let client = crate::db::FailingDatabaseClient;
        let result = ensure_ordered(&client, "SELECT a FROM t").await;
        assert!(result.is_err());
    }
}
