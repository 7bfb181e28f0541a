use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// Always logs to stderr. With `log_dir` set, also writes a daily-rotated
/// `pollsync.log` there; the returned guard must live until exit so buffered
/// lines get flushed.
pub fn init(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pollsync=info"));

  // Generic over the subscriber so the same config can sit on either stack.
  fn console_layer<S>() -> impl tracing_subscriber::Layer<S>
  where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
  {
    fmt::layer()
      .with_writer(std::io::stderr)
      .with_target(false)
  }

  let Some(dir) = log_dir else {
    tracing_subscriber::registry()
      .with(filter)
      .with(console_layer())
      .try_init()
      .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;
    return Ok(None);
  };

  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(dir, "pollsync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let file_layer = fmt::layer()
    .with_writer(writer)
    .with_ansi(false)
    .with_target(true)
    .with_line_number(true);

  tracing_subscriber::registry()
    .with(filter)
    .with(file_layer)
    .with(console_layer())
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  tracing::info!("logging to {}", dir.display());
  Ok(Some(guard))
}
