//! Mock connectors for testing.
//!
//! `MockConnector` answers every statement through a caller-supplied handler
//! and keeps track of calls, concurrency and bulk inserts so executor tests can
//! assert on them without a database.

use super::{Connector, StatementOutcome, TabularData, Value};
use crate::error::{FanoutError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Handler = dyn Fn(&str, &[Value]) -> Result<StatementOutcome> + Send + Sync;

/// A bulk insert captured by the mock.
#[derive(Debug, Clone)]
pub struct RecordedInsert {
    pub schema: String,
    pub table: String,
    pub data: TabularData,
}

/// A scripted connector backed by a closure.
pub struct MockConnector {
    handler: Arc<Handler>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    inserts: Mutex<Vec<RecordedInsert>>,
    fail_inserts: bool,
}

impl MockConnector {
    /// Creates a mock that answers every `execute` call with `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &[Value]) -> Result<StatementOutcome> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            inserts: Mutex::new(Vec::new()),
            fail_inserts: false,
        }
    }

    /// Makes every `execute` call sleep for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes every `bulk_insert` call fail.
    pub fn with_failing_inserts(mut self) -> Self {
        self.fail_inserts = true;
        self
    }

    /// Number of `execute` calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of `execute` calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Bulk inserts received so far.
    pub fn inserts(&self) -> Vec<RecordedInsert> {
        self.inserts
            .lock()
            .map(|inserts| inserts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn execute(&self, sql: &str, args: &[Value]) -> Result<StatementOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let outcome = (self.handler)(sql, args);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    async fn bulk_insert(&self, schema: &str, table: &str, data: &TabularData) -> Result<u64> {
        if self.fail_inserts {
            return Err(FanoutError::query(format!(
                "relation \"{schema}.{table}\" does not exist"
            )));
        }
        if data.is_empty() {
            return Ok(0);
        }

        let mut inserts = self
            .inserts
            .lock()
            .map_err(|e| FanoutError::internal(format!("mock insert log poisoned: {e}")))?;
        inserts.push(RecordedInsert {
            schema: schema.to_string(),
            table: table.to_string(),
            data: data.clone(),
        });
        Ok(data.row_count() as u64)
    }
}

/// A connector whose every call fails with the same query error.
pub struct FailingConnector {
    message: String,
}

impl FailingConnector {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Connector for FailingConnector {
    async fn execute(&self, _sql: &str, _args: &[Value]) -> Result<StatementOutcome> {
        Err(FanoutError::query(self.message.clone()))
    }

    async fn bulk_insert(&self, _schema: &str, _table: &str, _data: &TabularData) -> Result<u64> {
        Err(FanoutError::query(self.message.clone()))
    }
}
