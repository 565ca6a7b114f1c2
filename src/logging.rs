//! Sets up logging to stdout and to a debug log file.

use std::{fs::OpenOptions, io, sync::Arc};

use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// The file that debug-level logs are appended to.
pub const DEBUG_LOG_PATH: &str = "debug.log";

/// Install the global tracing subscriber.
///
/// Logs are written to stdout filtered by the `RUST_LOG` environment variable,
/// defaulting to `info`, and every debug-level log is appended to [DEBUG_LOG_PATH].
///
/// # Errors
/// Returns an error if the log file cannot be opened.
pub fn setup_logging() -> Result<(), io::Error> {
    let stdout_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(stdout_filter);

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(DEBUG_LOG_PATH)?;

    let debug_log = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Arc::new(log_file))
        .with_filter(LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(stdout_log)
        .with(debug_log)
        .init();

    Ok(())
}
