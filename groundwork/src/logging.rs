//! Logging initialization.
//!
//! Installs a stderr layer filtered by `RUST_LOG` plus a non-blocking file
//! layer under the home layout's `logs/` directory.

use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::errors::GroundworkResult;
use crate::layout::FilesystemLayout;

// Keeps the non-blocking writer flushing for the process lifetime.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize logging for the given home layout.
///
/// Safe to call more than once; only the first call installs the subscriber.
pub fn init_logging_for(layout: &FilesystemLayout) -> GroundworkResult<()> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    let file_appender = tracing_appender::rolling::daily(layout.logs_dir(), "groundwork.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init();

    if installed.is_ok() {
        let _ = LOG_GUARD.set(guard);
    }

    Ok(())
}
