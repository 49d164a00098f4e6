use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;

use linkq::api::{ApiClient, Queries};
use linkq::cache::CacheStore;
use linkq::commands::{self, Command};
use linkq::config::Config;
use linkq::logging;

#[derive(Parser, Debug)]
#[command(name = "linkq")]
#[command(about = "Browse a links & tags server through a stale-while-revalidate cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/linkq/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Base url of the API, overriding the config file
  #[arg(long)]
  api_url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override api url if specified on command line
  let config = if let Some(api_url) = args.api_url {
    Config { api_url, ..config }
  } else {
    config
  };

  // Held until exit so buffered log lines are flushed
  let _log_guard = logging::init(&config.log)?;

  let client = ApiClient::new(&config)?;
  let store = Arc::new(CacheStore::new());
  let queries = Queries::new(client, store, config.revalidate);

  commands::run(&queries, args.command).await
}
