//! Bounded-parallelism execution of a template over many combinations.
//!
//! One tokio task is spawned per combination. A semaphore caps how many of
//! them talk to the database at once, and a single loop joins them, folds
//! each result into the stats and fires the progress callback. Nothing else
//! touches the stats, so every snapshot the callback sees is consistent.

use super::sink::ResultSink;
use super::task::{run_task, StreamTarget, TaskContext};
use super::{ExecutionStats, QueryResult, RunReport, MAX_WORKERS, MIN_WORKERS};
use crate::db::Connector;
use crate::error::{FanoutError, Result};
use crate::params::Combination;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Called after every completed task with the current stats.
pub type ProgressCallback = Arc<dyn Fn(&ExecutionStats) + Send + Sync>;

/// Runs a SQL template once per combination.
pub struct Executor {
    connector: Arc<dyn Connector>,
    workers: usize,
    task_timeout: Option<Duration>,
    max_combinations: Option<usize>,
    on_progress: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl Executor {
    /// Creates an executor with `workers` concurrent tasks.
    ///
    /// Fails if `workers` is outside `1..=16`.
    pub fn new(connector: Arc<dyn Connector>, workers: usize) -> Result<Self> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
            return Err(FanoutError::config(format!(
                "workers must be between {MIN_WORKERS} and {MAX_WORKERS}, got {workers}"
            )));
        }
        Ok(Self {
            connector,
            workers,
            task_timeout: None,
            max_combinations: None,
            on_progress: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Fails any task whose statement runs longer than `timeout`.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    /// Rejects runs with more than `max` combinations before anything starts.
    pub fn with_max_combinations(mut self, max: usize) -> Self {
        self.max_combinations = Some(max);
        self
    }

    /// Registers a callback fired after each completed task.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ExecutionStats) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Token that stops the executor from starting further tasks.
    ///
    /// Tasks already running finish normally; the rest are reported as
    /// cancelled. Cancellation is permanent for this executor.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `template` once per combination and keeps every result set in memory.
    pub async fn execute(
        &self,
        template: &str,
        combinations: Vec<Combination>,
    ) -> Result<RunReport> {
        self.run(template, combinations, None).await
    }

    /// Runs `template` once per combination and hands each task's rows to
    /// `sink` as soon as that task finishes.
    ///
    /// Results carry counts only. With `tag_with_params`, each row gets one
    /// `_param_<name>` column per bound parameter before it is written.
    pub async fn execute_with_streaming(
        &self,
        template: &str,
        combinations: Vec<Combination>,
        sink: Arc<dyn ResultSink>,
        tag_with_params: bool,
    ) -> Result<RunReport> {
        info!("Streaming results to {}", sink.describe());
        let target = StreamTarget {
            sink,
            tag_with_params,
        };
        self.run(template, combinations, Some(target)).await
    }

    async fn run(
        &self,
        template: &str,
        combinations: Vec<Combination>,
        stream: Option<StreamTarget>,
    ) -> Result<RunReport> {
        if combinations.is_empty() {
            return Err(FanoutError::parameter("No combinations to execute"));
        }
        if let Some(max) = self.max_combinations {
            if combinations.len() > max {
                return Err(FanoutError::parameter(format!(
                    "{} combinations exceed the limit of {max}",
                    combinations.len()
                )));
            }
        }

        let total = combinations.len();
        info!("Executing {} combinations with {} workers", total, self.workers);

        let ctx = Arc::new(TaskContext {
            connector: Arc::clone(&self.connector),
            template: template.to_string(),
            timeout: self.task_timeout,
            stream,
        });
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<task::Id, Combination> = HashMap::with_capacity(total);

        for combination in combinations {
            let ctx = Arc::clone(&ctx);
            let permits = Arc::clone(&permits);
            let cancel = self.cancel.clone();
            let key = combination.clone();

            let handle = tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = permits.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    return QueryResult::cancelled(combination);
                };

                let fallback = combination.clone();
                match AssertUnwindSafe(run_task(&ctx, combination))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(payload) => {
                        QueryResult::failed(fallback, panic_message(payload.as_ref()))
                    }
                }
            });
            pending.insert(handle.id(), key);
        }

        let mut stats = ExecutionStats::new(total);
        let mut results = Vec::with_capacity(total);

        while let Some(joined) = tasks.join_next_with_id().await {
            let result = match joined {
                Ok((id, result)) => {
                    pending.remove(&id);
                    result
                }
                Err(e) => join_failure(&mut pending, e),
            };

            stats.record(&result);
            if let Some(callback) = &self.on_progress {
                callback(&stats);
            }
            results.push(result);
        }

        info!(
            "Execution finished in {:.2}s: {}",
            stats.elapsed.as_secs_f64(),
            stats.summary()
        );
        Ok(RunReport { results, stats })
    }
}

/// Result for a task that ended without returning one.
fn join_failure(pending: &mut HashMap<task::Id, Combination>, err: JoinError) -> QueryResult {
    error!("Task did not complete: {}", err);
    let combination = pending.remove(&err.id()).unwrap_or_else(Combination::empty);
    let message = if err.is_panic() {
        panic_message(err.into_panic().as_ref())
    } else {
        format!("task did not complete: {err}")
    };
    QueryResult::failed(combination, message)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => format!("task panicked: {detail}"),
        None => "task panicked".to_string(),
    }
}
