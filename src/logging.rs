//! Logging setup for fanout.
//!
//! Progress lines and results go to stdout/stderr directly; tracing output
//! goes to stderr by default, or to a file when `--log-file` is given so that
//! long runs leave a record behind.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initializes logging to stderr. `RUST_LOG` overrides `default_level`.
pub fn init_stderr_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_writer(std::io::stderr)
        .init();
}

/// Initializes logging to `path`, or to [`get_log_path`] when `path` is `None`.
///
/// The file is truncated on each run. Falls back to stderr if the file cannot
/// be created.
pub fn init_file_logging(path: Option<&Path>, default_level: &str) {
    let log_path = path.map(Path::to_path_buf).unwrap_or_else(get_log_path);

    if let Some(parent) = log_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            init_stderr_logging(default_level);
            return;
        }
    }

    let log_file = match File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file: {e}");
            init_stderr_logging(default_level);
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_writer(log_file)
        .with_ansi(false)
        .init();
}

/// Default log file location.
///
/// Uses the XDG state directory on Linux (`~/.local/state/db-fanout/fanout.log`),
/// falling back to the config directory, then the temp directory.
pub fn get_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("db-fanout").join("fanout.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("db-fanout").join("fanout.log");
    }

    std::env::temp_dir().join("fanout.log")
}
