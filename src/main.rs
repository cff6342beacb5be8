//! fanout - run a parameterized SQL template across many parameter values.

use db_fanout::cli::{Cli, Command, InspectArgs, OutputKind, RunArgs};
use db_fanout::config::{Config, ConnectionConfig};
use db_fanout::db::{Connector, PostgresConnector};
use db_fanout::error::{FanoutError, Result};
use db_fanout::runner::{Executor, ResultSink, RunReport, TableSink};
use db_fanout::{export, logging};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Failures listed after a run before the rest are summarized.
const MAX_REPORTED_FAILURES: usize = 10;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => logging::init_file_logging(path.as_deref(), cli.log_level()),
        None => logging::init_stderr_logging(cli.log_level()),
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        eprintln!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    match &cli.command {
        Command::Run(args) => run_template(&cli, args, &config).await,
        Command::Inspect(args) => inspect(args, &config),
        Command::TestConnection => {
            let (connector, conn) = connect(&cli, &config)?;
            let version = connector.test_connection().await?;
            println!("Connected to {}", conn.display_string());
            println!("{version}");
            Ok(())
        }
        Command::Schemas => {
            let (connector, _) = connect(&cli, &config)?;
            for schema in connector.list_schemas().await? {
                println!("{schema}");
            }
            Ok(())
        }
        Command::Tables { schema } => {
            let (connector, _) = connect(&cli, &config)?;
            for table in connector.list_tables(schema).await? {
                println!("{table}");
            }
            Ok(())
        }
    }
}

async fn run_template(cli: &Cli, args: &RunArgs, config: &Config) -> Result<()> {
    args.validate()?;
    let template = args.template.load()?;
    let mut space = args
        .params
        .build_space(&template, &config.runner.default_date_format)?;

    let (connector, conn) = connect(cli, config)?;
    info!("Connection: {}", conn.display_string());
    let connector = Arc::new(connector);

    for source in args.params.query_sources()? {
        if let Some(param) = space.get_mut(&source.name) {
            let loaded = param.set_from_query(connector.as_ref(), &source.body).await?;
            info!("Loaded {} values for :{}", loaded, source.name);
        }
    }
    for param in space.parameters() {
        if param.values.is_empty() {
            warn!("Parameter :{} has no values and is bound as NULL", param.name());
        }
    }

    let workers = args.workers.unwrap_or(config.runner.workers);
    let mut executor = Executor::new(connector.clone(), workers)?;
    if let Some(max) = config.runner.max_combinations {
        executor = executor.with_max_combinations(max);
    }
    if let Some(secs) = args.timeout.or(config.runner.task_timeout_secs) {
        executor = executor.with_task_timeout(Duration::from_secs(secs));
    }
    if !args.quiet {
        executor = executor.on_progress(|stats| {
            eprint!("\r{:>3.0}% {}   ", stats.progress() * 100.0, stats.summary())
        });
    }

    let combinations = space.generate_combinations_within(config.runner.max_combinations)?;
    if !args.quiet {
        eprintln!(
            "Running {} combinations on {} workers",
            combinations.len(),
            executor.workers()
        );
    }

    let cancel = executor.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; letting running tasks finish");
            cancel.cancel();
        }
    });

    let report = match (args.stream, &args.table) {
        (true, Some(table)) => {
            let sink = Arc::new(TableSink::new(connector.clone(), &args.schema, table));
            executor
                .execute_with_streaming(&template, combinations, sink, args.tag_params)
                .await?
        }
        _ => executor.execute(&template, combinations).await?,
    };
    if !args.quiet {
        eprintln!();
    }

    report_failures(&report);
    if !args.stream {
        write_output(args, &report, connector).await?;
    }

    let stats = &report.stats;
    eprintln!(
        "{} in {:.2}s ({} rows fetched, {} rows inserted)",
        stats.summary(),
        stats.elapsed.as_secs_f64(),
        stats.rows_fetched,
        stats.rows_inserted
    );

    if report.error_count() > 0 {
        return Err(FanoutError::query(format!(
            "{} of {} tasks failed",
            report.error_count(),
            stats.total
        )));
    }
    Ok(())
}

fn report_failures(report: &RunReport) {
    let failures: Vec<_> = report.failures().collect();
    for failure in failures.iter().take(MAX_REPORTED_FAILURES) {
        eprintln!(
            "  failed [{}]: {}",
            failure.combination,
            failure.error.as_deref().unwrap_or_default()
        );
    }
    if failures.len() > MAX_REPORTED_FAILURES {
        eprintln!("  ... and {} more", failures.len() - MAX_REPORTED_FAILURES);
    }
}

async fn write_output(
    args: &RunArgs,
    report: &RunReport,
    connector: Arc<PostgresConnector>,
) -> Result<()> {
    match args.output {
        OutputKind::Preview => {
            print!("{}", export::preview(&report.combined(), args.preview_rows));
        }
        OutputKind::Csv | OutputKind::Json | OutputKind::Excel => {
            let path = args
                .out
                .as_deref()
                .ok_or_else(|| FanoutError::config("csv, json and excel output require --out"))?;
            let combined = report.combined();
            let written = match args.output {
                OutputKind::Csv => export::to_csv(&combined, path)?,
                OutputKind::Json => export::to_json(&combined, path)?,
                _ => export::to_xlsx(&combined, path)?,
            };
            eprintln!("Wrote {} rows to {}", written, path.display());
        }
        OutputKind::Insert => {
            let table = args
                .table
                .as_deref()
                .ok_or_else(|| FanoutError::config("--output insert requires --table"))?;
            let connector: Arc<dyn Connector> = connector;
            let sink = TableSink::new(connector, &args.schema, table);
            let inserted = sink.write(&report.combined_with(args.tag_params)).await?;
            eprintln!("Inserted {} rows into {}", inserted, sink.describe());
        }
    }
    Ok(())
}

fn inspect(args: &InspectArgs, config: &Config) -> Result<()> {
    let template = args.template.load()?;
    let space = args
        .params
        .build_space(&template, &config.runner.default_date_format)?;
    let deferred: Vec<String> = args
        .params
        .query_sources()?
        .into_iter()
        .map(|s| s.name)
        .collect();

    if space.is_empty() {
        println!("No placeholders; the template runs once.");
        return Ok(());
    }

    for param in space.parameters() {
        let values = if deferred.iter().any(|name| name == param.name()) {
            "(loaded from query at run time)".to_string()
        } else {
            param.display_values(5)
        };
        println!(":{} ({}): {}", param.name(), param.param_type, values);
    }
    println!("Combinations: {}", space.combination_count());
    if !deferred.is_empty() {
        println!("(excluding parameters loaded from queries)");
    }
    Ok(())
}

/// Builds a connector from the resolved connection settings.
fn connect(cli: &Cli, config: &Config) -> Result<(PostgresConnector, ConnectionConfig)> {
    let conn = resolve_connection(cli, config)?.ok_or_else(|| {
        FanoutError::config(
            "No database connection configured. Use --url, --host/--database, or a [connections] profile",
        )
    })?;
    let connector = PostgresConnector::new(&conn)?;
    Ok((connector, conn))
}

/// Resolves the final connection configuration from CLI args, config file, and environment.
///
/// Precedence: CLI arguments, then the named profile, then the default
/// profile, then `PG*` environment variables for anything still unset.
/// Individual CLI arguments given alongside `--connection` override single
/// fields of that profile; a `--url` replaces it.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<Option<ConnectionConfig>> {
    let from_cli = cli.to_connection_config()?;

    let named = match cli.connection_name() {
        Some(name) => Some(config.get_connection(Some(name)).cloned().ok_or_else(|| {
            FanoutError::config(format!("Connection '{}' not found in config file", name))
        })?),
        None => None,
    };

    let mut connection = match (named, from_cli) {
        (Some(mut profile), Some(overrides)) if cli.url.is_none() => {
            profile.merge(&overrides);
            Some(profile)
        }
        (_, Some(cli_conn)) => Some(cli_conn),
        (Some(profile), None) => Some(profile),
        (None, None) => config.get_connection(None).cloned(),
    };

    if connection.is_none() && std::env::var("PGHOST").is_ok() {
        connection = Some(ConnectionConfig::default());
    }

    if let Some(ref mut conn) = connection {
        conn.apply_env_defaults();
    }

    Ok(connection)
}
