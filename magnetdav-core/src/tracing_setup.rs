//! Log output for the `magnetdav` binary
//!
//! The console shows the level picked on the command line. Every run also
//! rewrites a trace-level log under the logs directory.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File written under the logs directory on every run.
pub const LOG_FILE_NAME: &str = "magnetdav-last-run.log";

const DEFAULT_LOGS_DIR: &str = "logs";

/// Failures while installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Cannot create logs directory {path}: {source}")]
    LogsDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot create log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Tracing already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Filter directives for the console at `level`.
///
/// HTTP connection internals stay at warn so `--log-level trace` shows the
/// server's own spans rather than every frame.
pub fn console_directives(level: Level) -> String {
    format!(
        "{},hyper=warn,h2=warn",
        level.as_str().to_ascii_lowercase()
    )
}

/// Installs the console and trace-file layers.
///
/// `RUST_LOG`, when set, replaces the console directives. The file always
/// records everything.
///
/// # Errors
///
/// - `TracingError::LogsDir` / `LogFile` - If the log file cannot be created
/// - `TracingError::AlreadyInitialized` - If a global subscriber is already set
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> Result<(), TracingError> {
    let logs_dir = logs_dir.unwrap_or_else(|| Path::new(DEFAULT_LOGS_DIR));
    create_dir_all(logs_dir).map_err(|source| TracingError::LogsDir {
        path: logs_dir.to_path_buf(),
        source,
    })?;

    let log_path = logs_dir.join(LOG_FILE_NAME);
    let log_file = File::create(&log_path).map_err(|source| TracingError::LogFile {
        path: log_path.clone(),
        source,
    })?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_directives(console_level)));

    let console = fmt::layer().with_target(true).with_filter(console_filter);
    let trace_file = fmt::layer()
        .with_ansi(false)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(Mutex::new(log_file))
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console)
        .with(trace_file)
        .try_init()?;

    tracing::info!(
        "Logging to console at {} and to {}",
        console_level,
        log_path.display()
    );
    Ok(())
}

/// Console verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}
