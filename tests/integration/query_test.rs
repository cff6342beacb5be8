//! Statement execution integration tests.
//!
//! Tests positional binding, result conversion and bulk insert against a
//! real server.

use super::{get_test_connector, unique_table};
use db_fanout::db::{ColumnInfo, Connector, StatementOutcome, TabularData, Value};
use db_fanout::params::Combination;
use db_fanout::template;

fn rows(outcome: StatementOutcome) -> TabularData {
    match outcome {
        StatementOutcome::Rows(data) => data,
        other => panic!("expected rows, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bound_template_round_trips_values() {
    let Some(connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let combination = Combination::new(vec![
        ("n".to_string(), Value::Int(21)),
        ("label".to_string(), Value::from("north")),
    ]);
    let bound = template::substitute(
        "SELECT :n + :n AS twice, :label AS label, :missing::text IS NULL AS missing_is_null",
        &combination,
    );

    let data = rows(connector.execute(&bound.sql, &bound.args).await.unwrap());
    assert_eq!(data.column_names(), vec!["twice", "label", "missing_is_null"]);
    assert_eq!(
        data.rows,
        vec![vec![Value::Int(42), Value::from("north"), Value::Bool(true)]]
    );
}

#[tokio::test]
async fn test_date_parameter_binding() {
    let Some(connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let day = chrono::NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
    let data = rows(
        connector
            .execute("SELECT $1 + 1 AS next_day", &[Value::Date(day)])
            .await
            .unwrap(),
    );
    assert_eq!(
        data.rows[0][0],
        Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
    );
}

#[tokio::test]
async fn test_zero_row_select_keeps_columns() {
    let Some(connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let data = rows(
        connector
            .execute("SELECT 1 AS a, 'x' AS b WHERE false", &[])
            .await
            .unwrap(),
    );
    assert!(data.is_empty());
    assert_eq!(data.column_names(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_query_error_is_reported() {
    let Some(connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let error = connector
        .execute("SELECT * FROM table_that_does_not_exist_xyz", &[])
        .await
        .unwrap_err();
    assert!(error.to_string().contains("does not exist"));
}

#[tokio::test]
async fn test_bulk_insert_and_dml_counts() {
    let Some(connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let table = unique_table("fanout_copy");
    connector
        .execute(
            &format!("CREATE TABLE public.{table} (id bigint, note text, day date)"),
            &[],
        )
        .await
        .unwrap();

    let data = TabularData::with_data(
        vec![
            ColumnInfo::new("id", "bigint"),
            ColumnInfo::new("note", "text"),
            ColumnInfo::new("day", "date"),
        ],
        vec![
            vec![
                Value::Int(1),
                Value::from("tab\there, \"quoted\""),
                Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            ],
            vec![Value::Int(2), Value::Null, Value::Null],
        ],
    );
    let inserted = connector.bulk_insert("public", &table, &data).await.unwrap();

    let fetched = rows(
        connector
            .execute(&format!("SELECT id, note, day FROM public.{table} ORDER BY id"), &[])
            .await
            .unwrap(),
    );
    let deleted = connector
        .execute(&format!("DELETE FROM public.{table} WHERE id >= $1"), &[Value::Int(1)])
        .await
        .unwrap();
    connector
        .execute(&format!("DROP TABLE public.{table}"), &[])
        .await
        .unwrap();

    assert_eq!(inserted, 2);
    assert_eq!(fetched.rows, data.rows);
    assert_eq!(deleted, StatementOutcome::Affected(2));
}
