//! Connection integration tests.
//!
//! Tests database connectivity, catalog listing and error handling.

use super::get_test_connector;
use db_fanout::config::ConnectionConfig;
use db_fanout::db::PostgresConnector;
use db_fanout::error::FanoutError;

#[tokio::test]
async fn test_connection_reports_version() {
    let Some(connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let version = connector.test_connection().await.unwrap();
    assert!(version.starts_with("PostgreSQL"), "got {version}");
}

#[tokio::test]
async fn test_list_schemas_hides_system_schemas() {
    let Some(connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let schemas = connector.list_schemas().await.unwrap();
    assert!(schemas.iter().any(|s| s == "public"));
    assert!(!schemas.iter().any(|s| s == "pg_catalog"));
    assert!(!schemas.iter().any(|s| s == "information_schema"));
}

#[tokio::test]
async fn test_list_tables_of_missing_schema_is_empty() {
    let Some(connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let tables = connector
        .list_tables("schema_that_does_not_exist")
        .await
        .unwrap();
    assert!(tables.is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn test_connect_with_invalid_host() {
    let config = ConnectionConfig {
        host: Some("invalid.host.that.does.not.exist.local".to_string()),
        database: Some("testdb".to_string()),
        user: Some("testuser".to_string()),
        password: Some("testpass".to_string()),
        connect_timeout_secs: 5,
        ..Default::default()
    };

    let connector = PostgresConnector::new(&config).unwrap();
    let error = connector.test_connection().await.unwrap_err();
    assert!(
        matches!(error, FanoutError::Connection(_)),
        "Expected connection error, got: {error}"
    );
}

#[tokio::test(flavor = "current_thread")]
async fn test_connect_with_invalid_port() {
    let config = ConnectionConfig {
        host: Some("127.0.0.1".to_string()),
        port: 1,
        database: Some("testdb".to_string()),
        user: Some("testuser".to_string()),
        connect_timeout_secs: 5,
        ..Default::default()
    };

    let connector = PostgresConnector::new(&config).unwrap();
    let error = connector.list_schemas().await.unwrap_err();
    assert!(matches!(error, FanoutError::Connection(_)));
}
