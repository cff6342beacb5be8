//! Destinations for streamed results.

use crate::db::{Connector, TabularData};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Receives each task's rows as soon as the task finishes.
///
/// Implementations are called concurrently from several tasks.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Writes `data` and returns the number of rows written.
    async fn write(&self, data: &TabularData) -> Result<u64>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Appends rows to an existing table through the connector's bulk path.
pub struct TableSink {
    connector: Arc<dyn Connector>,
    schema: String,
    table: String,
}

impl TableSink {
    pub fn new(
        connector: Arc<dyn Connector>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            schema: schema.into(),
            table: table.into(),
        }
    }
}

#[async_trait]
impl ResultSink for TableSink {
    async fn write(&self, data: &TabularData) -> Result<u64> {
        if data.is_empty() {
            return Ok(0);
        }
        self.connector
            .bulk_insert(&self.schema, &self.table, data)
            .await
    }

    fn describe(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}
