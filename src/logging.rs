use crate::error::{EtlError, Result};
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "income_etl.log";

/// Directive used when RUST_LOG is not set; `verbose` forces debug
pub fn default_directive(level: &str, verbose: bool) -> String {
    let level = if verbose { "debug" } else { level };
    format!("income_etl={level},income_server={level},warn")
}

/// Console layer plus a daily rolling JSON file under `log_dir`.
/// Keep the returned guard alive until exit so the file gets flushed.
pub fn init_logging(level: &str, log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() && !verbose => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(default_directive(level, verbose)),
    }
    .map_err(|e| EtlError::Config(format!("Invalid log filter: {}", e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| EtlError::Config(format!("Logging already initialized: {}", e)))?;

    Ok(guard)
}
