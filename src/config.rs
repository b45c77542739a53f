use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::AppError;

/// ---------------------------------------------------------------------------
/// Configuration Defaults
/// ---------------------------------------------------------------------------

const DEFAULT_DB_PATH: &str = "workout-sync.db";
const DEFAULT_RETRY_TIMES: u32 = 3;
const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 3;
const DEFAULT_OFFLINE_AFTER_FAILURES: u32 = 2;
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;

/// ---------------------------------------------------------------------------
/// Configuration Structures
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RemoteConfig {
  pub base_url: Url,
  pub api_key: String,
  pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
  pub retry_times: u32,
  pub initial_delay: Duration,
  pub max_delay: Duration,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      retry_times: DEFAULT_RETRY_TIMES,
      initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
      max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
  pub probe_interval: Duration,
  pub offline_after_failures: u32,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      probe_interval: Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECS),
      offline_after_failures: DEFAULT_OFFLINE_AFTER_FAILURES,
    }
  }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub db_path: PathBuf,
  pub remote: RemoteConfig,
  pub sync: SyncConfig,
  pub network: NetworkConfig,
}

impl AppConfig {
  /// Read `.env` (if present) and the process environment
  pub fn from_env() -> Result<Self, AppError> {
    dotenvy::dotenv().ok();

    let db_path = env::var("WORKOUT_DB_PATH")
      .ok()
      .filter(|v| !v.trim().is_empty())
      .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

    Ok(Self {
      db_path: PathBuf::from(db_path),
      remote: RemoteConfig::from_env()?,
      sync: SyncConfig {
        retry_times: parse_var("SYNC_RETRY_TIMES", DEFAULT_RETRY_TIMES)?,
        initial_delay: Duration::from_millis(parse_var(
          "SYNC_INITIAL_DELAY_MS",
          DEFAULT_INITIAL_DELAY_MS,
        )?),
        max_delay: Duration::from_millis(parse_var("SYNC_MAX_DELAY_MS", DEFAULT_MAX_DELAY_MS)?),
      },
      network: NetworkConfig {
        probe_interval: Duration::from_secs(parse_var(
          "NETWORK_PROBE_INTERVAL_SECS",
          DEFAULT_PROBE_INTERVAL_SECS,
        )?),
        offline_after_failures: parse_var(
          "NETWORK_OFFLINE_AFTER_FAILURES",
          DEFAULT_OFFLINE_AFTER_FAILURES,
        )?,
      },
    })
  }
}

impl RemoteConfig {
  pub fn from_env() -> Result<Self, AppError> {
    let raw_url = required_var("REMOTE_API_URL")?;
    let base_url = Url::parse(&raw_url)
      .map_err(|e| AppError::Config(format!("REMOTE_API_URL is not a valid URL: {}", e)))?;

    Ok(Self {
      base_url,
      api_key: required_var("REMOTE_API_KEY")?,
      timeout: Duration::from_secs(parse_var("REMOTE_TIMEOUT_SECS", DEFAULT_REMOTE_TIMEOUT_SECS)?),
    })
  }
}

/// ---------------------------------------------------------------------------
/// Helpers
/// ---------------------------------------------------------------------------

fn required_var(name: &str) -> Result<String, AppError> {
  env::var(name)
    .ok()
    .filter(|v| !v.trim().is_empty())
    .ok_or_else(|| AppError::Config(name.to_string()))
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
  match env::var(name) {
    Ok(raw) if !raw.trim().is_empty() => raw
      .trim()
      .parse()
      .map_err(|_| AppError::Config(format!("{} has invalid value '{}'", name, raw))),
    _ => Ok(default),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  const BASE_VARS: [(&str, Option<&str>); 2] = [
    ("REMOTE_API_URL", Some("https://example.supabase.co")),
    ("REMOTE_API_KEY", Some("anon-key")),
  ];

  #[test]
  #[serial]
  fn test_defaults_apply_when_unset() {
    temp_env::with_vars(
      [
        BASE_VARS[0],
        BASE_VARS[1],
        ("WORKOUT_DB_PATH", None),
        ("SYNC_RETRY_TIMES", None),
        ("SYNC_INITIAL_DELAY_MS", None),
        ("SYNC_MAX_DELAY_MS", None),
        ("NETWORK_PROBE_INTERVAL_SECS", None),
        ("NETWORK_OFFLINE_AFTER_FAILURES", None),
        ("REMOTE_TIMEOUT_SECS", None),
      ],
      || {
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.db_path, PathBuf::from("workout-sync.db"));
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(config.network, NetworkConfig::default());
        assert_eq!(config.remote.timeout, Duration::from_secs(10));
        assert_eq!(config.remote.base_url.host_str(), Some("example.supabase.co"));
      },
    );
  }

  #[test]
  #[serial]
  fn test_overrides_are_parsed() {
    temp_env::with_vars(
      [
        BASE_VARS[0],
        BASE_VARS[1],
        ("SYNC_RETRY_TIMES", Some("5")),
        ("SYNC_INITIAL_DELAY_MS", Some("250")),
        ("NETWORK_OFFLINE_AFTER_FAILURES", Some("4")),
      ],
      || {
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.sync.retry_times, 5);
        assert_eq!(config.sync.initial_delay, Duration::from_millis(250));
        assert_eq!(config.network.offline_after_failures, 4);
      },
    );
  }

  #[test]
  #[serial]
  fn test_missing_remote_url_is_config_error() {
    temp_env::with_vars(
      [("REMOTE_API_URL", None), BASE_VARS[1]],
      || {
        let err = RemoteConfig::from_env().unwrap_err();
        assert!(matches!(err, AppError::Config(ref v) if v == "REMOTE_API_URL"));
      },
    );
  }

  #[test]
  #[serial]
  fn test_invalid_number_is_config_error() {
    temp_env::with_vars(
      [BASE_VARS[0], BASE_VARS[1], ("SYNC_RETRY_TIMES", Some("lots"))],
      || {
        assert!(matches!(AppConfig::from_env(), Err(AppError::Config(_))));
      },
    );
  }
}
