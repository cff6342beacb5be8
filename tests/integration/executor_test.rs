//! End-to-end runs against Postgres.

use super::{get_test_connector, unique_table};
use db_fanout::db::{Connector, StatementOutcome, Value};
use db_fanout::params::{ParamType, ParameterSpace};
use db_fanout::runner::{Executor, TableSink};
use std::sync::Arc;

#[tokio::test]
async fn test_run_generated_series_per_combination() {
    let Some(connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let template = "SELECT g AS n, :label AS label FROM generate_series(1, :count) AS g";
    let mut space = ParameterSpace::new();
    space.declare_from_template(template);
    space.get_mut("label").unwrap().set_values(&["a", "b"]);
    let count = space.get_mut("count").unwrap();
    count.param_type = ParamType::Number;
    count.set_from_range("1", "3");

    let executor = Executor::new(Arc::new(connector), 4).unwrap();
    let report = executor
        .execute(template, space.generate_combinations())
        .await
        .unwrap();

    assert_eq!(report.results.len(), 6);
    assert_eq!(report.error_count(), 0);
    // (1 + 2 + 3) rows for each of two labels.
    assert_eq!(report.stats.rows_fetched, 12);

    let combined = report.combined();
    assert_eq!(
        combined.column_names(),
        vec!["n", "label", "_param_label", "_param_count"]
    );
    assert!(combined.rows.iter().all(|row| row[1] == row[2]));
}

#[tokio::test]
async fn test_failing_combination_does_not_stop_run() {
    let Some(connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let template = "SELECT 10 / :d AS q";
    let mut space = ParameterSpace::new();
    space
        .add_parameter("d", ParamType::Number)
        .set_values(&["1", "0", "5"]);

    let executor = Executor::new(Arc::new(connector), 2).unwrap();
    let report = executor
        .execute(template, space.generate_combinations())
        .await
        .unwrap();

    assert_eq!(report.success_count(), 2);
    assert_eq!(report.error_count(), 1);
    let failed: Vec<_> = report.failures().collect();
    assert_eq!(failed[0].combination.get("d"), Some(&Value::Int(0)));
    assert!(failed[0].error.as_deref().unwrap().contains("division by zero"));
}

#[tokio::test]
async fn test_streaming_into_table() {
    let Some(connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let connector = Arc::new(connector);

    let table = unique_table("fanout_stream");
    connector
        .execute(
            &format!("CREATE TABLE public.{table} (n bigint, _param_k bigint)"),
            &[],
        )
        .await
        .unwrap();

    let template = "SELECT g::bigint AS n FROM generate_series(1, 100) AS g WHERE g % 5 = :k";
    let mut space = ParameterSpace::new();
    space.add_parameter("k", ParamType::Number).set_from_range("0", "4");

    let sink = Arc::new(TableSink::new(connector.clone(), "public", &table));
    let executor = Executor::new(connector.clone(), 3).unwrap();
    let report = executor
        .execute_with_streaming(template, space.generate_combinations(), sink, true)
        .await
        .unwrap();

    let count = connector
        .execute(&format!("SELECT count(*) AS c FROM public.{table}"), &[])
        .await
        .unwrap();
    connector
        .execute(&format!("DROP TABLE public.{table}"), &[])
        .await
        .unwrap();

    assert_eq!(report.error_count(), 0);
    assert_eq!(report.stats.rows_inserted, 100);
    assert!(report.results.iter().all(|r| r.data.is_none()));
    match count {
        StatementOutcome::Rows(data) => assert_eq!(data.rows[0][0], Value::Int(100)),
        other => panic!("expected rows, got {other:?}"),
    }
}

#[tokio::test]
async fn test_untyped_parameters_match_int_and_date_columns() {
    let Some(connector) = get_test_connector() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let connector = Arc::new(connector);

    let table = unique_table("fanout_orders");
    connector
        .execute(
            &format!(
                "CREATE TABLE public.{table} AS \
                 SELECT g::int AS id, DATE '2024-01-01' + g AS day, (g * 10)::numeric AS amount \
                 FROM generate_series(1, 4) AS g"
            ),
            &[],
        )
        .await
        .unwrap();

    // Declared from the template, so both placeholders are plain text.
    let template = format!("SELECT amount FROM public.{table} WHERE id = :id AND day > :after");
    let mut space = ParameterSpace::new();
    space.declare_from_template(&template);
    space.get_mut("id").unwrap().set_values(&["1", "2", "3"]);
    space.get_mut("after").unwrap().set_values(&["2024-01-02"]);

    let executor = Executor::new(connector.clone(), 2).unwrap();
    let report = executor
        .execute(&template, space.generate_combinations())
        .await
        .unwrap();

    connector
        .execute(&format!("DROP TABLE public.{table}"), &[])
        .await
        .unwrap();

    assert_eq!(report.error_count(), 0, "{:?}", report.failures().collect::<Vec<_>>());
    // id 1 is on 2024-01-02, which is not after the cutoff.
    assert_eq!(report.stats.rows_fetched, 2);
    let mut amounts: Vec<String> = report
        .combined()
        .rows
        .iter()
        .map(|row| row[0].to_string())
        .collect();
    amounts.sort();
    assert_eq!(amounts, vec!["20", "30"]);
}
