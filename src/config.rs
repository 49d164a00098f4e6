use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::query::RevalidateMode;

const SESSION_ENV: &str = "LINKQ_SESSION";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Base url of the links API
  pub api_url: String,
  /// What a cache hit does: refresh in the background, or nothing
  pub revalidate: RevalidateMode,
  /// Per-request timeout
  pub timeout_secs: u64,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Filter directive used when RUST_LOG is not set (e.g. "info", "linkq=debug")
  pub level: String,
  /// Write logs to a daily file under the data directory instead of stderr
  pub file: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api_url: "http://localhost:3000".to_string(),
      revalidate: RevalidateMode::default(),
      timeout_secs: 30,
      log: LogConfig::default(),
    }
  }
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: false,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./linkq.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/linkq/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("linkq.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("linkq").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    let config: Config = serde_yaml::from_str(contents)?;
    if config.timeout_secs == 0 {
      return Err(eyre!("timeout_secs must be greater than zero"));
    }
    Ok(config)
  }

  /// Get the session cookie from the environment, if signed in.
  ///
  /// Reads LINKQ_SESSION, e.g. `better-auth.session_token=...`.
  pub fn get_session() -> Option<String> {
    std::env::var(SESSION_ENV)
      .ok()
      .filter(|value| !value.trim().is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.api_url, "http://localhost:3000");
    assert_eq!(config.revalidate, RevalidateMode::Background);
    assert_eq!(config.timeout_secs, 30);
    assert_eq!(config.log.level, "info");
    assert!(!config.log.file);
  }

  #[test]
  fn test_parse_full() {
    let yaml = r#"
api_url: "https://links.example.com/api"
revalidate: never
timeout_secs: 5
log:
  level: debug
  file: true
"#;
    let config = Config::parse(yaml).unwrap();

    assert_eq!(config.api_url, "https://links.example.com/api");
    assert_eq!(config.revalidate, RevalidateMode::Never);
    assert_eq!(config.timeout_secs, 5);
    assert_eq!(config.log.level, "debug");
    assert!(config.log.file);
  }

  #[test]
  fn test_parse_partial_uses_defaults() {
    let config = Config::parse("api_url: http://127.0.0.1:8787\n").unwrap();

    assert_eq!(config.api_url, "http://127.0.0.1:8787");
    assert_eq!(config.revalidate, RevalidateMode::Background);
    assert_eq!(config.log.level, "info");
  }

  #[test]
  fn test_parse_empty() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.timeout_secs, 30);
  }

  #[test]
  fn test_parse_rejects_unknown_mode() {
    assert!(Config::parse("revalidate: sometimes\n").is_err());
  }

  #[test]
  fn test_parse_rejects_zero_timeout() {
    assert!(Config::parse("timeout_secs: 0\n").is_err());
  }

  #[test]
  fn test_load_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "revalidate: never").unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.revalidate, RevalidateMode::Never);
  }

  #[test]
  fn test_load_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
