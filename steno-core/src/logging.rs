//! Structured logging setup (component M).
//!
//! Mirrors the desktop client's `tracing_subscriber::fmt` + `EnvFilter`
//! setup, plus a non-rotating file layer (`tracing-appender`) writing to
//! the literal `log_path` since the daemon, unlike the desktop app, has no
//! attached terminal to rely on for diagnostics.

use std::path::Path;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes global tracing: stderr (human-readable) plus a file layer
/// writing to the literal `log_path` (e.g. `<base>/daemon.log`, per the
/// filesystem layout contract — `rolling::never` is used rather than
/// `rolling::daily` so the path isn't suffixed with a date). Returns the
/// appender guard — it must be kept alive for the process lifetime or
/// buffered log lines are dropped on exit.
pub fn init(log_path: &Path, default_level: &str) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = EnvFilter::try_from_env("STENO_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let log_dir = log_path.parent().unwrap_or_else(|| Path::new("."));
    let log_file_name = log_path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("daemon.log"));
    let file_appender = tracing_appender::rolling::never(log_dir, log_file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}
