//! Diagnostic logging
//!
//! `tracing` output goes to a daily-rolling file in the XDG state directory
//! (`~/.local/state/aicf/aicf.log.<date>`). `RUST_LOG` wins over the
//! configured level. The watcher's user-facing activity log is separate, see
//! [`crate::watcher::activity`].

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// File name prefix of the rolling diagnostic log.
const LOG_FILE_PREFIX: &str = "aicf.log";

/// Install the global subscriber.
///
/// `verbose` lowers the floor to `debug` and mirrors output to stderr in
/// compact form. Call once per process; the returned guard must outlive
/// every log call.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let (writer, guard) = file_writer(&log_dir, config.max_files)?;
    let level = effective_level(config, verbose);

    let stderr_layer = verbose.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed()
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(stderr_layer)
        .init();

    tracing::info!(log_dir = %log_dir.display(), level, verbose, "Logging initialized");

    Ok(LoggingGuard { _guard: guard })
}

fn file_writer(log_dir: &Path, max_files: usize) -> Result<(NonBlocking, WorkerGuard)> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(max_files.max(1))
        .build(log_dir)
        .map_err(|e| Error::Config(format!("failed to create log appender: {e}")))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Level used when `RUST_LOG` is unset.
fn effective_level(config: &LoggingConfig, verbose: bool) -> &str {
    if verbose {
        "debug"
    } else {
        config.level.as_str()
    }
}

/// Initialize logging for tests (captured by the test harness)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Flushes buffered log lines when dropped.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}
