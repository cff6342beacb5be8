//! The body of a single task: bind, execute, and optionally stream.

use super::aggregate::tag_with_params;
use super::sink::ResultSink;
use super::QueryResult;
use crate::db::{Connector, StatementOutcome, TabularData, Value};
use crate::error::{FanoutError, Result};
use crate::params::Combination;
use crate::template;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Where streamed rows go.
pub(crate) struct StreamTarget {
    pub sink: Arc<dyn ResultSink>,
    pub tag_with_params: bool,
}

/// Everything a task needs, shared by all tasks of a run.
pub(crate) struct TaskContext {
    pub connector: Arc<dyn Connector>,
    pub template: String,
    pub timeout: Option<Duration>,
    pub stream: Option<StreamTarget>,
}

/// Runs the template for one combination. Never fails; errors end up in the result.
pub(crate) async fn run_task(ctx: &TaskContext, combination: Combination) -> QueryResult {
    let start = Instant::now();
    let bound = template::substitute(&ctx.template, &combination);
    debug!("Executing with {}", combination);

    let outcome = execute_with_timeout(ctx, &bound.sql, &bound.args).await;
    let result = match outcome {
        Ok(StatementOutcome::Rows(data)) => match &ctx.stream {
            Some(target) => {
                let row_count = data.row_count() as u64;
                match stream_rows(target, &combination, data).await {
                    Ok(inserted) => QueryResult::streamed(combination, row_count, inserted),
                    Err(e) => QueryResult::failed(combination, e.to_string()),
                }
            }
            None => QueryResult::rows(combination, data),
        },
        Ok(StatementOutcome::Affected(n)) => QueryResult::affected(combination, n),
        Err(e) => QueryResult::failed(combination, e.to_string()),
    };

    if let Some(error) = &result.error {
        warn!("Task {} failed: {}", result.combination, error);
    }
    result.with_execution_time(start.elapsed())
}

async fn execute_with_timeout(
    ctx: &TaskContext,
    sql: &str,
    args: &[Value],
) -> Result<StatementOutcome> {
    let call = ctx.connector.execute(sql, args);
    match ctx.timeout {
        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
            FanoutError::query(format!("timed out after {}s", limit.as_secs()))
        })?,
        None => call.await,
    }
}

async fn stream_rows(
    target: &StreamTarget,
    combination: &Combination,
    data: TabularData,
) -> Result<u64> {
    if data.is_empty() {
        return Ok(0);
    }
    let data = if target.tag_with_params {
        tag_with_params(&data, combination)
    } else {
        data
    };
    target.sink.write(&data).await
}
