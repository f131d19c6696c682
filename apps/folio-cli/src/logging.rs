//! Logging setup using tracing.
//!
//! Human-readable events go to stderr. With `--log-file` the same events are
//! also appended, without colors, to the given file. `RUST_LOG` overrides the
//! level chosen from `-v`.

use crate::error::{CliError, CliResult};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for a `-v` count.
pub fn filter_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn,folio_import=info,folio_cli=info",
        1 => "info,folio_import=debug,folio_client=info",
        _ => "debug,folio_import=trace,folio_client=debug",
    }
}

/// Initialize the global subscriber.
///
/// Returns an error if the log file cannot be opened. A second call is a
/// no-op.
pub fn init_logging(verbosity: u8, log_file: Option<&Path>) -> CliResult<()> {
    let filter = filter_for(verbosity);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .map_err(|e| CliError::Config(format!("invalid log filter: {e}")))?;

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    CliError::Io(format!("cannot open log file {}: {e}", path.display()))
                })?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    tracing::debug!(filter = %filter, "Logging initialized");
    Ok(())
}
