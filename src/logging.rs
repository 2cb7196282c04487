//! Tracing subscriber setup

use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

const DEFAULT_FILTER: &str = "info";

/// Logs to `log_file` (filtered by `RUST_LOG`, default `info`) and mirrors
/// warnings to stderr.
///
/// The returned guard flushes the file writer when dropped.
pub fn init(log_file: &Path, json: bool) -> anyhow::Result<WorkerGuard> {
    let dir = log_file.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let file_name = log_file
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("invalid log path: {}", log_file.display()))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = if json {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_ansi(false)
            .boxed()
    } else {
        fmt::layer().with_writer(writer).with_ansi(false).boxed()
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(LevelFilter::from_level(Level::WARN));

    tracing_subscriber::registry()
        .with(file_layer.with_filter(filter))
        .with(stderr_layer)
        .try_init()?;

    Ok(guard)
}
