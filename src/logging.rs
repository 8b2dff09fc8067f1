use std::fs;
use std::path::Path;
use tracing::{Span, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};
use uuid::Uuid;

use crate::constants;

/// Initializes console output plus a daily-rotated JSON log under `log_dir`.
/// Keep the returned guard alive until exit so buffered lines are flushed.
pub fn init_logging(log_dir: &Path) -> WorkerGuard {
    let _ = fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, constants::LOG_FILE_NAME);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stdout);

    // Respect RUST_LOG if set; otherwise info for our crate
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("timetable_normalizer=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_file_layer(non_blocking_writer))
        .with(console_layer)
        .init();

    guard
}

/// JSON lines carrying the enclosing span's fields, so every line of a
/// run can be grouped by its `run_id`
pub fn json_file_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(writer)
}

/// Root span of one CLI invocation
pub fn run_span(command: &str) -> Span {
    tracing::info_span!("run", run_id = %Uuid::new_v4(), command)
}
