//! PostgreSQL connector implementation.
//!
//! Provides the `PostgresConnector` struct that implements the `Connector`
//! trait using sqlx. Every call opens its own connection and closes it when
//! done, so concurrent tasks never share a session.

use crate::config::ConnectionConfig;
use crate::db::{ColumnInfo, Connector, Row, StatementOutcome, TabularData, Value};
use crate::error::{FanoutError, Result};
use crate::params::{parse_date, DEFAULT_DATE_FORMAT};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::{Oid, PgInterval};
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgConnectOptions, PgConnection, PgRow, PgTypeInfo,
};
use sqlx::query::Query;
use sqlx::types::{Json, Uuid};
use sqlx::{
    Column as SqlxColumn, Connection, Either, Encode, Executor, Postgres, Row as SqlxRow,
    Statement, Type, TypeInfo,
};
use std::time::{Duration, Instant};
use tracing::debug;

/// Schemas hidden from `list_schemas`.
const SYSTEM_SCHEMAS: [&str; 3] = ["information_schema", "pg_catalog", "pg_toast"];

/// NULL marker used in the COPY payload.
const COPY_NULL: &str = "\\N";

/// PostgreSQL connector.
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    config: ConnectionConfig,
    options: PgConnectOptions,
    connect_timeout: Duration,
}

impl PostgresConnector {
    /// Creates a connector for the given configuration.
    ///
    /// No connection is opened here; each call opens its own.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;
        let options: PgConnectOptions = conn_str
            .parse()
            .map_err(|e| FanoutError::config(format!("Invalid connection settings: {e}")))?;

        Ok(Self {
            config: config.clone(),
            options,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        })
    }

    /// Opens a fresh connection, bounded by the configured connect timeout.
    async fn open(&self) -> Result<PgConnection> {
        let start = Instant::now();
        let connect = PgConnection::connect_with(&self.options);
        let conn = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| {
                let host = self.config.host.as_deref().unwrap_or("localhost");
                FanoutError::connection(format!(
                    "Connection to {host}:{} timed out after {} seconds",
                    self.config.port,
                    self.connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| map_connection_error(e, &self.config))?;

        debug!("Opened connection in {:?}", start.elapsed());
        Ok(conn)
    }

    /// Connects and returns the server version string.
    pub async fn test_connection(&self) -> Result<String> {
        let mut conn = self.open().await?;
        let version: String = sqlx::query_scalar("SELECT version()")
            .fetch_one(&mut conn)
            .await
            .map_err(|e| FanoutError::query(format_query_error(e)))?;
        let _ = conn.close().await;
        Ok(version)
    }

    /// Lists user schemas, excluding the Postgres system schemas.
    pub async fn list_schemas(&self) -> Result<Vec<String>> {
        let mut conn = self.open().await?;
        let schemas: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT schema_name::text
            FROM information_schema.schemata
            WHERE schema_name <> ALL($1)
            ORDER BY schema_name
            "#,
        )
        .bind(&SYSTEM_SCHEMAS[..])
        .fetch_all(&mut conn)
        .await
        .map_err(|e| FanoutError::query(format!("Failed to fetch schemas: {e}")))?;
        let _ = conn.close().await;
        Ok(schemas)
    }

    /// Lists the tables of a schema.
    pub async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let mut conn = self.open().await?;
        let tables: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = $1
            ORDER BY table_name
            "#,
        )
        .bind(schema)
        .fetch_all(&mut conn)
        .await
        .map_err(|e| FanoutError::query(format!("Failed to fetch tables for {schema}: {e}")))?;
        let _ = conn.close().await;
        Ok(tables)
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn execute(&self, sql: &str, args: &[Value]) -> Result<StatementOutcome> {
        let mut conn = self.open().await?;

        // Prepare first so row-returning statements keep their column
        // metadata even when they produce zero rows. Text and NULL arguments
        // are left untyped so the server infers them from context.
        let declared: Vec<PgTypeInfo> = args.iter().map(param_type_info).collect();
        let statement = (&mut conn)
            .prepare_with(sql, &declared)
            .await
            .map_err(|e| FanoutError::query(format_query_error(e)))?;

        let inferred: Vec<PgTypeInfo> = match statement.parameters() {
            Some(Either::Left(types)) => types.to_vec(),
            _ => Vec::new(),
        };
        let query = args
            .iter()
            .enumerate()
            .try_fold(statement.query(), |query, (i, value)| {
                bind_value(query, value, inferred.get(i))
                    .map_err(|e| FanoutError::query(format!("Parameter ${}: {e}", i + 1)))
            })?;

        let outcome = if statement.columns().is_empty() {
            let done = query
                .execute(&mut conn)
                .await
                .map_err(|e| FanoutError::query(format_query_error(e)))?;
            StatementOutcome::Affected(done.rows_affected())
        } else {
            let columns: Vec<ColumnInfo> = statement
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect();
            let rows = query
                .fetch_all(&mut conn)
                .await
                .map_err(|e| FanoutError::query(format_query_error(e)))?;
            let rows = rows.iter().map(convert_row).collect::<Result<Vec<Row>>>()?;
            StatementOutcome::Rows(TabularData::with_data(columns, rows))
        };

        let _ = conn.close().await;
        Ok(outcome)
    }

    async fn bulk_insert(&self, schema: &str, table: &str, data: &TabularData) -> Result<u64> {
        if data.is_empty() {
            return Ok(0);
        }

        let statement = copy_statement(schema, table, data);
        let payload = encode_copy_payload(data)?;

        let mut conn = self.open().await?;
        let mut copy = conn
            .copy_in_raw(&statement)
            .await
            .map_err(|e| FanoutError::query(format_query_error(e)))?;
        copy.send(payload)
            .await
            .map_err(|e| FanoutError::query(format_query_error(e)))?;
        let inserted = copy
            .finish()
            .await
            .map_err(|e| FanoutError::query(format_query_error(e)))?;

        let _ = conn.close().await;
        debug!("Copied {} rows into {}.{}", inserted, schema, table);
        Ok(inserted)
    }
}

/// OID 0: lets the server infer the parameter type.
fn unspecified_type() -> PgTypeInfo {
    PgTypeInfo::with_oid(Oid(0))
}

/// The Postgres type a value is declared as when preparing.
fn param_type_info(value: &Value) -> PgTypeInfo {
    match value {
        Value::Null | Value::String(_) => unspecified_type(),
        Value::Bool(_) => <bool as Type<Postgres>>::type_info(),
        Value::Int(_) => <i64 as Type<Postgres>>::type_info(),
        Value::Float(_) => <f64 as Type<Postgres>>::type_info(),
        Value::Decimal(_) => <Decimal as Type<Postgres>>::type_info(),
        Value::Date(_) => <NaiveDate as Type<Postgres>>::type_info(),
        Value::Json(_) => <Json<serde_json::Value> as Type<Postgres>>::type_info(),
        Value::Bytes(_) => <Vec<u8> as Type<Postgres>>::type_info(),
    }
}

/// A NULL argument that takes whatever type the server inferred.
struct TypedNull(PgTypeInfo);

impl Type<Postgres> for TypedNull {
    fn type_info() -> PgTypeInfo {
        unspecified_type()
    }

    fn compatible(_: &PgTypeInfo) -> bool {
        true
    }
}

impl Encode<'_, Postgres> for TypedNull {
    fn encode_by_ref(
        &self,
        _buf: &mut PgArgumentBuffer,
    ) -> std::result::Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(self.0.clone())
    }
}

/// Binds one argument, converting text to the type the server inferred.
///
/// Typed values were declared when preparing and are bound as-is.
fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
    inferred: Option<&PgTypeInfo>,
) -> std::result::Result<Query<'q, Postgres, PgArguments>, String> {
    let query = match value {
        Value::Null => match inferred {
            Some(type_info) => query.bind(TypedNull(type_info.clone())),
            None => query.bind(None::<String>),
        },
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Decimal(d) => query.bind(*d),
        Value::Date(d) => query.bind(*d),
        Value::Json(j) => query.bind(Json(j.clone())),
        Value::Bytes(b) => query.bind(b.clone()),
        Value::String(s) => {
            let type_name = inferred.map(|t| t.name()).unwrap_or("TEXT");
            bind_text(query, s, type_name)?
        }
    };
    Ok(query)
}

/// Binds a text argument as `type_name`, parsing it first.
fn bind_text<'q>(
    query: Query<'q, Postgres, PgArguments>,
    text: &str,
    type_name: &str,
) -> std::result::Result<Query<'q, Postgres, PgArguments>, String> {
    fn parsed<T: std::str::FromStr>(
        text: &str,
        type_name: &str,
    ) -> std::result::Result<T, String> {
        text.trim()
            .parse::<T>()
            .map_err(|_| format!("'{text}' is not a valid {}", type_name.to_lowercase()))
    }
    let invalid = || format!("'{text}' is not a valid {}", type_name.to_lowercase());

    let query = match type_name {
        "INT2" => query.bind(parsed::<i16>(text, type_name)?),
        "INT4" => query.bind(parsed::<i32>(text, type_name)?),
        "INT8" => query.bind(parsed::<i64>(text, type_name)?),
        "FLOAT4" => query.bind(parsed::<f32>(text, type_name)?),
        "FLOAT8" => query.bind(parsed::<f64>(text, type_name)?),
        "NUMERIC" => query.bind(parsed::<Decimal>(text, type_name)?),
        "UUID" => query.bind(parsed::<Uuid>(text, type_name)?),
        "BOOL" => query.bind(parse_bool(text).ok_or_else(invalid)?),
        "DATE" => query.bind(parse_date(text.trim(), DEFAULT_DATE_FORMAT).ok_or_else(invalid)?),
        "TIMESTAMP" => query.bind(parse_timestamp(text).ok_or_else(invalid)?),
        "TIMESTAMPTZ" => query.bind(
            DateTime::parse_from_rfc3339(text.trim())
                .map(|ts| ts.with_timezone(&Utc))
                .or_else(|_| parse_timestamp(text).map(|ts| ts.and_utc()).ok_or(()))
                .map_err(|_| invalid())?,
        ),
        "JSON" | "JSONB" => query.bind(Json(
            serde_json::from_str::<serde_json::Value>(text).map_err(|_| invalid())?,
        )),
        _ => query.bind(text.to_string()),
    };
    Ok(query)
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS[.f]`, the `T` form, or a bare date at midnight.
fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| parse_date(text, DEFAULT_DATE_FORMAT).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Quotes an identifier for use in generated SQL.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Builds the `COPY ... FROM STDIN` statement for a table.
fn copy_statement(schema: &str, table: &str, data: &TabularData) -> String {
    let columns: Vec<String> = data.columns.iter().map(|c| quote_ident(&c.name)).collect();
    format!(
        "COPY {}.{} ({}) FROM STDIN WITH (FORMAT CSV, DELIMITER E'\\t', NULL '{}')",
        quote_ident(schema),
        quote_ident(table),
        columns.join(", "),
        COPY_NULL
    )
}

/// Encodes rows as tab-delimited CSV with `\N` for NULL.
fn encode_copy_payload(data: &TabularData) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(Vec::new());

    for row in &data.rows {
        writer.write_record(row.iter().map(copy_field))?;
    }

    writer
        .into_inner()
        .map_err(|e| FanoutError::internal(format!("Failed to encode COPY payload: {e}")))
}

/// Renders one value in the text form Postgres accepts for COPY.
fn copy_field(value: &Value) -> String {
    match value {
        Value::Null => COPY_NULL.to_string(),
        Value::Bytes(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            format!("\\x{hex}")
        }
        other => other.to_display_string(),
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Result<Row> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let type_name = col.type_info().name();
            convert_value(row, i, type_name).map_err(|e| {
                FanoutError::query(format!(
                    "Cannot read column '{}' of type {}: {e}",
                    col.name(),
                    type_name.to_lowercase()
                ))
            })
        })
        .collect()
}

/// Decodes a nullable column into a Value.
fn decode<'r, T>(
    row: &'r PgRow,
    index: usize,
    wrap: impl FnOnce(T) -> Value,
) -> std::result::Result<Value, sqlx::Error>
where
    T: sqlx::Decode<'r, Postgres> + Type<Postgres>,
{
    Ok(row.try_get::<Option<T>, _>(index)?.map(wrap).unwrap_or(Value::Null))
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(
    row: &PgRow,
    index: usize,
    type_name: &str,
) -> std::result::Result<Value, sqlx::Error> {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => decode(row, index, Value::Bool),
        "INT2" | "SMALLINT" => decode(row, index, |v: i16| Value::Int(v as i64)),
        "INT4" | "INT" | "INTEGER" => decode(row, index, |v: i32| Value::Int(v as i64)),
        "INT8" | "BIGINT" => decode(row, index, Value::Int),
        "OID" => decode(row, index, |v: Oid| Value::Int(v.0 as i64)),
        "FLOAT4" | "REAL" => decode(row, index, |v: f32| Value::Float(v as f64)),
        "FLOAT8" | "DOUBLE PRECISION" => decode(row, index, Value::Float),
        "NUMERIC" => decode(row, index, Value::Decimal),
        "DATE" => decode(row, index, Value::Date),
        "TIME" => decode(row, index, |v: NaiveTime| Value::String(v.to_string())),
        "TIMESTAMP" => decode(row, index, |v: NaiveDateTime| Value::String(v.to_string())),
        "TIMESTAMPTZ" => decode(row, index, |v: DateTime<Utc>| Value::String(v.to_rfc3339())),
        "INTERVAL" => decode(row, index, |v: PgInterval| Value::String(format_interval(&v))),
        "UUID" => decode(row, index, |v: Uuid| Value::String(v.to_string())),
        "JSON" | "JSONB" => decode(row, index, |v: Json<serde_json::Value>| Value::Json(v.0)),
        "BYTEA" => decode(row, index, Value::Bytes),
        // Text-like types (varchar, name, enums, ...) carry UTF-8 on the wire.
        _ => Ok(row
            .try_get_unchecked::<Option<String>, _>(index)?
            .map(Value::String)
            .unwrap_or(Value::Null)),
    }
}

/// Renders an interval the way Postgres prints it (`1 year 2 mons 3 days 04:05:06`).
fn format_interval(interval: &PgInterval) -> String {
    fn unit(n: i64, name: &str, plural: &str) -> Option<String> {
        match n {
            0 => None,
            1 | -1 => Some(format!("{n} {name}")),
            _ => Some(format!("{n} {plural}")),
        }
    }

    let years = (interval.months / 12) as i64;
    let months = (interval.months % 12) as i64;
    let mut parts: Vec<String> = [
        unit(years, "year", "years"),
        unit(months, "mon", "mons"),
        unit(interval.days as i64, "day", "days"),
    ]
    .into_iter()
    .flatten()
    .collect();

    let micros = interval.microseconds;
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let micros = micros.unsigned_abs();
        let secs = micros / 1_000_000;
        let frac = micros % 1_000_000;
        let mut clock = format!("{sign}{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60);
        if frac != 0 {
            let digits = format!("{frac:06}");
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }
    parts.join(" ")
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> FanoutError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        FanoutError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        FanoutError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        FanoutError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        FanoutError::connection(
            "Server requires SSL. Set sslmode = \"require\" on the connection.".to_string(),
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        FanoutError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        FanoutError::connection(error.to_string())
    }
}

/// Formats a statement error with Postgres DETAIL/HINT fields when available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }

        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }

        if let Some(table) = pg_error.table() {
            result.push_str("\n  TABLE: ");
            result.push_str(table);
        }

        if let Some(column) = pg_error.column() {
            result.push_str("\n  COLUMN: ");
            result.push_str(column);
        }

        if let Some(constraint) = pg_error.constraint() {
            result.push_str("\n  CONSTRAINT: ");
            result.push_str(constraint);
        }
    }

    result
}
