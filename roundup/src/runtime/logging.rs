//! Tracing subscriber setup.

use std::path::Path;

use roundup_shared::{RoundupError, RoundupResult};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Keeps the file writer flushing. Drop it only at process exit.
#[must_use]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// Console output always goes to stderr. With `log_dir`, events are also
/// appended to a daily-rolling `<file_prefix>.log.YYYY-MM-DD` there, without
/// ANSI colors. The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init_logging(log_dir: Option<&Path>, file_prefix: &str) -> RoundupResult<LoggingGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                RoundupError::Config(format!(
                    "cannot create log directory {}: {e}",
                    dir.display()
                ))
            })?;
            let appender = tracing_appender::rolling::daily(dir, format!("{file_prefix}.log"));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| RoundupError::Internal(format!("logging already initialized: {e}")))?;

    Ok(LoggingGuard { _file: guard })
}
