//! Logging infrastructure for the view orchestration core.
//!
//! Provides structured logging with file output and console output:
//! - Writes to `logs/terraview.log` (cleared on session start)
//! - Also prints to stdout for tailing during development
//! - Configurable via the RUST_LOG environment variable
//!
//! Hosts embedding the library can skip this module entirely and install
//! their own `tracing` subscriber; every component logs through the
//! `tracing` macros either way.

use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard will flush and close the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize logging.
///
/// Creates the log directory if needed, clears the previous log file,
/// and sets up dual output to both file and stdout.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or the log
/// file cannot be cleared.
pub fn init_logging(log_dir: &str, log_file: &str) -> Result<LoggingGuard, io::Error> {
    fs::create_dir_all(log_dir)?;

    // Truncate rather than delete so an open tail keeps following.
    let log_path = Path::new(log_dir).join(log_file);
    fs::write(&log_path, "")?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .pretty();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true)
        .with_span_events(FmtSpan::CLOSE)
        .pretty();

    // Defaults to INFO when RUST_LOG is not set
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Get default log directory path.
pub fn default_log_dir() -> &'static str {
    "logs"
}

/// Get default log file name.
pub fn default_log_file() -> &'static str {
    "terraview.log"
}
