use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Install the global tracing subscriber.
///
/// RUST_LOG takes precedence over the configured level. When file logging is
/// enabled the returned guard must be kept alive until exit, or buffered
/// lines are lost.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(&config.level))
    .map_err(|e| eyre!("Invalid log level '{}': {}", config.level, e))?;

  if config.file {
    let dir = log_dir()?;
    std::fs::create_dir_all(&dir)
      .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

    let appender = tracing_appender::rolling::daily(&dir, "linkq.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
      .with(filter)
      .with(fmt::layer().with_writer(writer).with_ansi(false))
      .try_init()
      .map_err(|e| eyre!("Failed to install logger: {}", e))?;

    Ok(Some(guard))
  } else {
    tracing_subscriber::registry()
      .with(filter)
      .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
      .try_init()
      .map_err(|e| eyre!("Failed to install logger: {}", e))?;

    Ok(None)
  }
}

/// Directory for log files: $XDG_DATA_HOME/linkq/logs
fn log_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("linkq").join("logs"))
}
