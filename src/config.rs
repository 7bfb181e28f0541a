use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::SyncOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub remote: RemoteConfig,
  #[serde(default)]
  pub identity: IdentityConfig,
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Base URL of the polling API
  pub url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
  /// Authenticated user id; votes are anonymous per-device when unset
  pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
  /// Database path (default: $XDG_DATA_HOME/pollsync/store.db)
  pub path: Option<PathBuf>,
  /// Quota reported by usage estimates
  pub quota_mb: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub staleness_secs: u64,
  pub interval_secs: u64,
  pub concurrency: usize,
  pub cache_max_age_hours: u64,
  pub recent_limit: usize,
  pub probe_interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      staleness_secs: 300,
      interval_secs: 60,
      concurrency: 1,
      cache_max_age_hours: 168,
      recent_limit: 50,
      probe_interval_secs: 10,
    }
  }
}

fn default_timeout_secs() -> u64 {
  15
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./pollsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/pollsync/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/pollsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("pollsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("pollsync").join("config.yaml");
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

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    Ok(config)
  }

  /// Get the API token from environment variables, if any.
  ///
  /// Checks POLLSYNC_API_TOKEN first, then POLL_API_TOKEN as fallback.
  pub fn get_api_token() -> Option<String> {
    std::env::var("POLLSYNC_API_TOKEN")
      .or_else(|_| std::env::var("POLL_API_TOKEN"))
      .ok()
  }

  pub fn remote_timeout(&self) -> Duration {
    Duration::from_secs(self.remote.timeout_secs)
  }

  pub fn sync_options(&self) -> Result<SyncOptions> {
    Ok(SyncOptions {
      staleness: duration_setting(
        "sync.staleness_secs",
        self.sync.staleness_secs,
        chrono::Duration::try_seconds,
      )?,
      remote_timeout: self.remote_timeout(),
      concurrency: self.sync.concurrency.max(1),
    })
  }

  pub fn quota_bytes(&self) -> Option<u64> {
    self.store.quota_mb.map(|mb| mb.saturating_mul(1024 * 1024))
  }

  pub fn cache_max_age(&self) -> Result<chrono::Duration> {
    duration_setting(
      "sync.cache_max_age_hours",
      self.sync.cache_max_age_hours,
      chrono::Duration::try_hours,
    )
  }
}

/// Convert a configured count of units, rejecting values chrono cannot hold.
fn duration_setting(
  name: &str,
  value: u64,
  unit: fn(i64) -> Option<chrono::Duration>,
) -> Result<chrono::Duration> {
  i64::try_from(value)
    .ok()
    .and_then(unit)
    .ok_or_else(|| eyre!("{} is out of range: {}", name, value))
}
