//! db-fanout - run a parameterized SQL template across every combination of
//! parameter values, concurrently.
//!
//! The pieces, bottom up:
//! - [`params`]: parameters, their value sets, and cartesian expansion.
//! - [`template`]: `:name` placeholder extraction and positional binding.
//! - [`db`]: the [`db::Connector`] seam and its Postgres implementation.
//! - [`runner`]: the bounded-parallelism executor and result aggregation.
//! - [`export`]: CSV, JSON and terminal output.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod logging;
pub mod params;
pub mod runner;
pub mod template;
