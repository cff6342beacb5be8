//! Error types for db-fanout.
//!
//! Defines the main error enum used throughout the crate. Per-task failures
//! inside a run never surface as these errors; they are recorded on the
//! task's `QueryResult` instead.

use thiserror::Error;

/// Main error type for db-fanout operations.
#[derive(Error, Debug)]
pub enum FanoutError {
    /// Database connection errors (host unreachable, auth failed, timeout, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement execution errors (syntax errors, constraint violations, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Parameter space or run setup errors (no combinations, bad worker count, etc.)
    #[error("Parameter error: {0}")]
    Parameter(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors while writing results to a file.
    #[error("Export error: {0}")]
    Export(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FanoutError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a parameter error with the given message.
    pub fn parameter(msg: impl Into<String>) -> Self {
        Self::Parameter(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an export error with the given message.
    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Parameter(_) => "Parameter Error",
            Self::Config(_) => "Configuration Error",
            Self::Export(_) => "Export Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

impl From<csv::Error> for FanoutError {
    fn from(e: csv::Error) -> Self {
        Self::Export(e.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for FanoutError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        Self::Export(e.to_string())
    }
}

impl From<std::io::Error> for FanoutError {
    fn from(e: std::io::Error) -> Self {
        Self::Export(e.to_string())
    }
}

/// Result type alias using FanoutError.
pub type Result<T> = std::result::Result<T, FanoutError>;
