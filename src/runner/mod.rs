//! Parametric query execution.
//!
//! Expands a template over a list of combinations, runs one task per
//! combination with bounded parallelism, and either buffers the results or
//! streams them into a sink.

pub mod aggregate;
mod executor;
pub mod sink;
mod task;

pub use aggregate::{
    combine_results, combine_results_with, error_count, success_count, tag_with_params,
    PARAM_COLUMN_PREFIX,
};
pub use executor::{Executor, ProgressCallback};
pub use sink::{ResultSink, TableSink};

use crate::db::TabularData;
use crate::params::Combination;
use std::time::{Duration, Instant};

/// Smallest allowed worker count.
pub const MIN_WORKERS: usize = 1;

/// Largest allowed worker count.
pub const MAX_WORKERS: usize = 16;

/// Outcome of one task.
///
/// Exactly one of three shapes: succeeded (with or without `data`), failed
/// (`error` set), or cancelled before it started.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// The parameter values this task ran with.
    pub combination: Combination,

    /// Rows returned by the statement. Absent for DML, failures and streamed runs.
    pub data: Option<TabularData>,

    /// Failure message, if the task failed.
    pub error: Option<String>,

    /// Rows returned, or rows affected for statements without a result set.
    pub row_count: u64,

    /// Rows written to the sink. Non-zero only in streaming mode.
    pub rows_inserted: u64,

    /// Wall time spent in the task.
    pub execution_time: Duration,

    /// True if the run was cancelled before this task started.
    pub cancelled: bool,
}

impl QueryResult {
    fn base(combination: Combination) -> Self {
        Self {
            combination,
            data: None,
            error: None,
            row_count: 0,
            rows_inserted: 0,
            execution_time: Duration::ZERO,
            cancelled: false,
        }
    }

    /// A task whose statement returned rows.
    pub fn rows(combination: Combination, data: TabularData) -> Self {
        Self {
            row_count: data.row_count() as u64,
            data: Some(data),
            ..Self::base(combination)
        }
    }

    /// A task whose statement returned no result set.
    pub fn affected(combination: Combination, rows_affected: u64) -> Self {
        Self {
            row_count: rows_affected,
            ..Self::base(combination)
        }
    }

    /// A task whose rows were handed to a sink instead of being kept.
    pub fn streamed(combination: Combination, row_count: u64, rows_inserted: u64) -> Self {
        Self {
            row_count,
            rows_inserted,
            ..Self::base(combination)
        }
    }

    pub fn failed(combination: Combination, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(combination)
        }
    }

    pub fn cancelled(combination: Combination) -> Self {
        Self {
            cancelled: true,
            ..Self::base(combination)
        }
    }

    pub fn with_execution_time(mut self, execution_time: Duration) -> Self {
        self.execution_time = execution_time;
        self
    }

    /// True if the task ran and did not fail.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.cancelled
    }
}

/// Running counters for one run.
///
/// Updated once per completed task at the executor's single aggregation
/// point; the progress callback only ever sees complete snapshots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionStats {
    pub total: usize,
    pub completed: usize,
    pub success: usize,
    pub errors: usize,
    pub cancelled: usize,
    pub rows_fetched: u64,
    pub rows_inserted: u64,
    pub start_time: Instant,
    pub elapsed: Duration,
    pub avg_time_per_task: Duration,
    pub estimated_remaining: Duration,
}

impl ExecutionStats {
    /// Fresh stats for a run of `total` tasks, starting now.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            success: 0,
            errors: 0,
            cancelled: 0,
            rows_fetched: 0,
            rows_inserted: 0,
            start_time: Instant::now(),
            elapsed: Duration::ZERO,
            avg_time_per_task: Duration::ZERO,
            estimated_remaining: Duration::ZERO,
        }
    }

    /// Folds one completed task into the counters.
    pub(crate) fn record(&mut self, result: &QueryResult) {
        self.completed += 1;
        if result.cancelled {
            self.cancelled += 1;
        } else if result.error.is_some() {
            self.errors += 1;
        } else {
            self.success += 1;
            self.rows_fetched += result.row_count;
            self.rows_inserted += result.rows_inserted;
        }

        self.elapsed = self.start_time.elapsed();
        self.avg_time_per_task =
            Duration::from_secs_f64(self.elapsed.as_secs_f64() / self.completed as f64);
        let remaining = self.total.saturating_sub(self.completed);
        self.estimated_remaining = self.avg_time_per_task.mul_f64(remaining as f64);
    }

    /// True once every task has completed.
    pub fn is_finished(&self) -> bool {
        self.completed >= self.total
    }

    /// Fraction of tasks completed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }

    /// One-line progress summary.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{}/{} done, {} ok, {} failed",
            self.completed, self.total, self.success, self.errors
        );
        if self.cancelled > 0 {
            line.push_str(&format!(", {} cancelled", self.cancelled));
        }
        if !self.is_finished() {
            line.push_str(&format!(", ETA {}s", self.estimated_remaining.as_secs()));
        }
        line
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// One result per combination, in completion order.
    pub results: Vec<QueryResult>,

    /// Final counters.
    pub stats: ExecutionStats,
}

impl RunReport {
    pub fn success_count(&self) -> usize {
        success_count(&self.results)
    }

    pub fn error_count(&self) -> usize {
        error_count(&self.results)
    }

    /// All buffered rows, tagged with their parameter values.
    ///
    /// Row order follows completion order and is not deterministic.
    pub fn combined(&self) -> TabularData {
        combine_results(&self.results)
    }

    /// All buffered rows, optionally without the parameter columns.
    pub fn combined_with(&self, tag_with_params: bool) -> TabularData {
        combine_results_with(&self.results, tag_with_params)
    }

    /// Results that failed, for reporting.
    pub fn failures(&self) -> impl Iterator<Item = &QueryResult> {
        self.results.iter().filter(|r| r.error.is_some())
    }
}
