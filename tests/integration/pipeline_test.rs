//! Whole-pipeline tests against the mock connector: arguments to parameter
//! space, space to run, run to exported file. No database needed.

use clap::Parser;
use db_fanout::cli::{Cli, Command};
use db_fanout::db::{ColumnInfo, MockConnector, StatementOutcome, TabularData, Value};
use db_fanout::export;
use db_fanout::runner::Executor;
use std::sync::{Arc, Mutex};

/// Echoes the bound arguments back as a single row.
fn echo_connector() -> MockConnector {
    MockConnector::new(|_, args| {
        Ok(StatementOutcome::Rows(TabularData::with_data(
            (0..args.len())
                .map(|i| ColumnInfo::new(format!("arg{}", i + 1), "text"))
                .collect(),
            vec![args.to_vec()],
        )))
    })
}

#[tokio::test]
async fn test_cli_arguments_drive_a_full_run() {
    let cli = Cli::parse_from([
        "fanout",
        "run",
        "--sql",
        "SELECT :region, :day",
        "--param",
        "region=north,south",
        "--range",
        "day=01/03/2024..03/03/2024",
        "--date-format",
        "%d/%m/%Y",
        "-w",
        "2",
    ]);
    let Command::Run(args) = cli.command else {
        panic!("expected run");
    };

    let template = args.template.load().unwrap();
    let space = args.params.build_space(&template, "%Y-%m-%d").unwrap();
    assert_eq!(space.combination_count(), 6);
    assert!(space.generate_combinations_within(Some(5)).is_err());

    let mock = Arc::new(echo_connector());
    let executor = Executor::new(mock.clone(), args.workers.unwrap()).unwrap();
    let report = executor
        .execute(&template, space.generate_combinations())
        .await
        .unwrap();

    assert_eq!(mock.call_count(), 6);
    assert!(mock.max_in_flight() <= 2);

    let combined = report.combined();
    assert_eq!(
        combined.column_names(),
        vec!["arg1", "arg2", "_param_region", "_param_day"]
    );
    let mut seen: Vec<String> = combined
        .rows
        .iter()
        .map(|r| format!("{}@{}", r[0], r[1]))
        .collect();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            "north@2024-03-01",
            "north@2024-03-02",
            "north@2024-03-03",
            "south@2024-03-01",
            "south@2024-03-02",
            "south@2024-03-03",
        ]
    );
}

#[tokio::test]
async fn test_run_exports_to_csv_and_json() {
    let cli = Cli::parse_from([
        "fanout",
        "run",
        "--sql",
        "SELECT :id",
        "--param",
        "id:number=1,2,3",
    ]);
    let Command::Run(args) = cli.command else {
        panic!("expected run");
    };
    let template = args.template.load().unwrap();
    let space = args.params.build_space(&template, "%Y-%m-%d").unwrap();

    let executor = Executor::new(Arc::new(echo_connector()), 3).unwrap();
    let report = executor
        .execute(&template, space.generate_combinations())
        .await
        .unwrap();
    let combined = report.combined();

    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("out.csv");
    let json_path = dir.path().join("out.json");
    let xlsx_path = dir.path().join("out.xlsx");

    assert_eq!(export::to_csv(&combined, &csv_path).unwrap(), 3);
    assert_eq!(export::to_json(&combined, &json_path).unwrap(), 3);
    assert_eq!(export::to_xlsx(&combined, &xlsx_path).unwrap(), 3);
    assert!(std::fs::metadata(&xlsx_path).unwrap().len() > 0);

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert!(csv.starts_with("arg1,_param_id\n"));
    assert_eq!(csv.lines().count(), 4);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    let mut ids: Vec<i64> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["_param_id"].as_i64().unwrap())
        .collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_progress_snapshots_are_monotonic() {
    let snapshots = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&snapshots);

    let executor = Executor::new(Arc::new(echo_connector()), 4)
        .unwrap()
        .on_progress(move |stats| {
            recorder
                .lock()
                .unwrap()
                .push((stats.completed, stats.success + stats.errors + stats.cancelled));
        });

    let combinations = (0..20)
        .map(|i| {
            db_fanout::params::Combination::new(vec![("i".to_string(), Value::Int(i))])
        })
        .collect();
    executor.execute("SELECT :i", combinations).await.unwrap();

    let snapshots = snapshots.lock().unwrap();
    assert_eq!(snapshots.len(), 20);
    for (index, (completed, accounted)) in snapshots.iter().enumerate() {
        assert_eq!(*completed, index + 1);
        assert_eq!(completed, accounted);
    }
}

#[test]
fn test_oversized_cli_space_is_refused_before_running() {
    let cli = Cli::parse_from([
        "fanout",
        "run",
        "--sql",
        "SELECT :a, :b",
        "--range",
        "a=1..100000",
        "--range",
        "b=1..100000",
    ]);
    let Command::Run(args) = cli.command else {
        panic!("expected run");
    };
    let template = args.template.load().unwrap();
    let space = args.params.build_space(&template, "%Y-%m-%d").unwrap();

    assert_eq!(space.combination_count(), 10_000_000_000);
    let err = space.generate_combinations_within(Some(100_000)).unwrap_err();
    assert!(err.to_string().contains("exceed the limit of 100000"));
}
