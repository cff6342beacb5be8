//! Database abstraction layer for db-fanout.
//!
//! Provides a trait-based connector interface so the executor can run
//! against Postgres or against an in-memory mock in tests.

mod mock;
mod postgres;
mod types;

pub use mock::{FailingConnector, MockConnector, RecordedInsert};
pub use postgres::PostgresConnector;
pub use types::{ColumnInfo, Row, StatementOutcome, TabularData, Value};

use crate::error::Result;
use async_trait::async_trait;

/// Capability to execute statements and bulk-load rows against a backend.
///
/// Implementations acquire whatever connection they need per call; the
/// executor never shares a connection between tasks.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Executes a SQL statement with positional arguments (`$1`, `$2`, ...).
    async fn execute(&self, sql: &str, args: &[Value]) -> Result<StatementOutcome>;

    /// Bulk-inserts rows into an existing `schema.table`.
    ///
    /// Returns the number of rows inserted. Empty input is a no-op returning 0.
    async fn bulk_insert(&self, schema: &str, table: &str, data: &TabularData) -> Result<u64>;
}

/// Runs `sql` and returns the distinct non-NULL values of its first column,
/// in order of first appearance.
pub async fn values_from_query(connector: &dyn Connector, sql: &str) -> Result<Vec<Value>> {
    let data = match connector.execute(sql, &[]).await? {
        StatementOutcome::Rows(data) => data,
        StatementOutcome::Affected(_) => return Ok(Vec::new()),
    };

    let mut values: Vec<Value> = Vec::new();
    for value in data.rows.into_iter().filter_map(|row| row.into_iter().next()) {
        if !value.is_null() && !values.contains(&value) {
            values.push(value);
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FanoutError;

    fn single_column(values: Vec<Value>) -> StatementOutcome {
        StatementOutcome::Rows(TabularData::with_data(
            vec![ColumnInfo::new("region", "text")],
            values.into_iter().map(|v| vec![v]).collect(),
        ))
    }

    #[tokio::test]
    async fn test_values_from_query_dedupes_and_drops_nulls() {
        let connector = MockConnector::new(|_, _| {
            Ok(single_column(vec![
                Value::from("north"),
                Value::Null,
                Value::from("south"),
                Value::from("north"),
            ]))
        });

        let values = values_from_query(&connector, "SELECT region FROM regions")
            .await
            .unwrap();
        assert_eq!(values, vec![Value::from("north"), Value::from("south")]);
    }

    #[tokio::test]
    async fn test_values_from_query_dml_yields_nothing() {
        let connector = MockConnector::new(|_, _| Ok(StatementOutcome::Affected(3)));
        let values = values_from_query(&connector, "DELETE FROM t").await.unwrap();
        assert!(values.is_empty());
    }

    #[tokio::test]
    async fn test_values_from_query_propagates_errors() {
        let connector = FailingConnector::new("relation \"regions\" does not exist");
        let err = values_from_query(&connector, "SELECT region FROM regions")
            .await
            .unwrap_err();
        assert!(matches!(err, FanoutError::Query(_)));
    }
}
