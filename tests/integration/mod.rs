//! Integration tests for db-fanout.

pub mod connection_test;
pub mod executor_test;
pub mod pipeline_test;
pub mod query_test;

use db_fanout::config::ConnectionConfig;
use db_fanout::db::PostgresConnector;

/// Connector for the database named by DATABASE_URL, if set.
pub fn get_test_connector() -> Option<PostgresConnector> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    PostgresConnector::new(&config).ok()
}

/// A table name no other test run will use.
pub fn unique_table(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    format!("{prefix}_{}_{nanos}", std::process::id())
}
