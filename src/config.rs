use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::remote::{RateLimiter, RetryPolicy};
use crate::sync::SyncSettings;

pub const DEFAULT_BASE_URL: &str = "https://api.ticktick.com/open/v1";

/// Longest accepted cache duration (100 years); longer values are clamped.
pub const MAX_CACHE_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Longest accepted delay, interval or pause (one day); longer values are clamped.
pub const MAX_DELAY_SECS: u64 = 24 * 60 * 60;

fn cache_duration(secs: u64) -> chrono::Duration {
  // MAX_CACHE_SECS fits in i64.
  chrono::Duration::seconds(secs.min(MAX_CACHE_SECS) as i64)
}

fn delay(secs: u64) -> Duration {
  Duration::from_secs(secs.min(MAX_DELAY_SECS))
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
  pub remote: RemoteConfig,
  pub store: StoreConfig,
  pub cache: CacheConfig,
  pub retry: RetryConfig,
  pub sync: SyncConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
  pub base_url: String,
  /// Minimum spacing between two remote calls
  pub min_interval_secs: u64,
  pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_BASE_URL.to_string(),
      min_interval_secs: 2,
      request_timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
  /// SQLite file (defaults to the platform data directory)
  pub path: Option<PathBuf>,
}

/// Cache durations per entity kind, in seconds.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
  pub tasks_secs: u64,
  pub projects_secs: u64,
  pub notes_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      tasks_secs: 300,
      projects_secs: 3600,
      notes_secs: 300,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
  pub max_attempts: u32,
  pub base_delay_secs: u64,
  pub min_delay_secs: u64,
  pub max_delay_secs: u64,
  /// Added on top of the backoff when the service reports quota exhaustion
  pub rate_limit_extra_secs: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay_secs: 4,
      min_delay_secs: 4,
      max_delay_secs: 10,
      rate_limit_extra_secs: 10,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
  /// Project names to sync, as a list or a comma-separated string
  #[serde(deserialize_with = "deserialize_project_list")]
  pub projects: Vec<String>,
  pub batch_size: usize,
  pub batch_pause_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      projects: Vec::new(),
      batch_size: 5,
      batch_pause_secs: 5,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
  /// Also write a daily rolling log file here
  pub directory: Option<PathBuf>,
}

fn deserialize_project_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum ProjectList {
    List(Vec<String>),
    Joined(String),
  }

  Ok(match ProjectList::deserialize(deserializer)? {
    ProjectList::List(names) => names
      .into_iter()
      .map(|n| n.trim().to_string())
      .filter(|n| !n.is_empty())
      .collect(),
    ProjectList::Joined(joined) => parse_project_list(&joined),
  })
}

/// Split a comma-separated list of project names, dropping blanks.
pub fn parse_project_list(joined: &str) -> Vec<String> {
  joined
    .split(',')
    .map(str::trim)
    .filter(|n| !n.is_empty())
    .map(str::to_string)
    .collect()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tickmirror.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tickmirror/config.yaml
  ///
  /// Without an explicit path, a missing file means defaults.
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
    let local = PathBuf::from("tickmirror.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tickmirror").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    // An empty file deserializes to unit, not to an empty mapping.
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Apply TICKMIRROR_PROJECTS and TICKMIRROR_DB from the process environment.
  pub fn apply_env(self) -> Self {
    self.apply_env_with(|key| std::env::var(key).ok())
  }

  fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
    if let Some(projects) = lookup("TICKMIRROR_PROJECTS") {
      self.sync.projects = parse_project_list(&projects);
    }
    if let Some(db) = lookup("TICKMIRROR_DB").filter(|v| !v.trim().is_empty()) {
      self.store.path = Some(PathBuf::from(db));
    }
    self
  }

  pub fn sync_settings(&self) -> SyncSettings {
    SyncSettings {
      project_ttl: cache_duration(self.cache.projects_secs),
      task_ttl: cache_duration(self.cache.tasks_secs),
      note_ttl: cache_duration(self.cache.notes_secs),
      project_allow_list: self.sync.projects.clone(),
      batch_size: self.sync.batch_size.max(1),
      batch_pause: delay(self.sync.batch_pause_secs),
    }
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    let r = &self.retry;
    RetryPolicy::new(r.max_attempts)
      .with_backoff(
        delay(r.base_delay_secs),
        delay(r.min_delay_secs),
        delay(r.max_delay_secs),
      )
      .with_rate_limit_extra(delay(r.rate_limit_extra_secs))
  }

  pub fn rate_limiter(&self) -> RateLimiter {
    RateLimiter::new(delay(self.remote.min_interval_secs))
  }

  pub fn request_timeout(&self) -> Duration {
    delay(self.remote.request_timeout_secs)
  }

  /// Get the TickTick access token from environment variables.
  ///
  /// Checks TICKMIRROR_ACCESS_TOKEN first, then DIDA365_ACCESS_TOKEN as fallback.
  pub fn get_access_token() -> Result<String> {
    std::env::var("TICKMIRROR_ACCESS_TOKEN")
      .or_else(|_| std::env::var("DIDA365_ACCESS_TOKEN"))
      .map_err(|_| {
        eyre!(
          "Access token not found. Set TICKMIRROR_ACCESS_TOKEN or DIDA365_ACCESS_TOKEN environment variable."
        )
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  #[test]
  fn test_empty_file_yields_defaults() {
    let config = Config::parse("").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.remote.base_url, DEFAULT_BASE_URL);
    assert_eq!(config.cache.projects_secs, 3600);
  }

  #[test]
  fn test_partial_sections_keep_other_defaults() {
    let config = Config::parse(
      r#"
cache:
  tasks_secs: 60
retry:
  max_attempts: 5
"#,
    )
    .unwrap();
    assert_eq!(config.cache.tasks_secs, 60);
    assert_eq!(config.cache.notes_secs, 300);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.rate_limit_extra_secs, 10);
  }

  #[test]
  fn test_projects_accept_list_or_comma_string() {
    let listed = Config::parse("sync:\n  projects: [Work, ' Home ']\n").unwrap();
    assert_eq!(listed.sync.projects, vec!["Work", "Home"]);

    let joined = Config::parse("sync:\n  projects: \"Work, Home,,\"\n").unwrap();
    assert_eq!(joined.sync.projects, vec!["Work", "Home"]);
  }

  #[test]
  fn test_env_overrides_file_values() {
    let env: HashMap<&str, &str> = [
      ("TICKMIRROR_PROJECTS", "Inbox,Errands"),
      ("TICKMIRROR_DB", "/tmp/mirror.db"),
    ]
    .into_iter()
    .collect();

    let config = Config::parse("sync:\n  projects: Work\n")
      .unwrap()
      .apply_env_with(|key| env.get(key).map(|v| v.to_string()));

    assert_eq!(config.sync.projects, vec!["Inbox", "Errands"]);
    assert_eq!(config.store.path, Some(PathBuf::from("/tmp/mirror.db")));
  }

  #[test]
  fn test_settings_conversion() {
    let mut config = Config::default();
    config.sync.batch_size = 0;
    config.sync.projects = vec!["Work".into()];

    let settings = config.sync_settings();
    assert_eq!(settings.task_ttl, chrono::Duration::minutes(5));
    assert_eq!(settings.project_ttl, chrono::Duration::hours(1));
    assert_eq!(settings.batch_size, 1);
    assert_eq!(settings.project_allow_list, vec!["Work"]);

    let policy = config.retry_policy();
    assert_eq!(policy, RetryPolicy::default());
    assert_eq!(config.rate_limiter().min_interval(), Duration::from_secs(2));
  }

  #[test]
  fn test_extreme_durations_are_clamped() {
    let config = Config::parse(
      r#"
cache:
  tasks_secs: 18446744073709551615
  projects_secs: 9223372036854775
remote:
  min_interval_secs: 18446744073709551615
retry:
  max_delay_secs: 18446744073709551615
  rate_limit_extra_secs: 18446744073709551615
sync:
  batch_pause_secs: 18446744073709551615
"#,
    )
    .unwrap();

    let settings = config.sync_settings();
    let max_ttl = chrono::Duration::seconds(MAX_CACHE_SECS as i64);
    assert_eq!(settings.task_ttl, max_ttl);
    assert_eq!(settings.project_ttl, max_ttl);
    assert_eq!(settings.batch_pause, Duration::from_secs(MAX_DELAY_SECS));
    assert!(chrono::Utc::now().checked_add_signed(max_ttl).is_some());

    let max_delay = Duration::from_secs(MAX_DELAY_SECS);
    assert_eq!(config.rate_limiter().min_interval(), max_delay);
    assert_eq!(
      config.retry_policy().backoff_for(1, true),
      Duration::from_secs(4) + max_delay
    );
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load(Some(&dir.path().join("absent.yaml"))).is_err());
  }

  #[test]
  fn test_load_reads_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "remote:\n  min_interval_secs: 3\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.remote.min_interval_secs, 3);
  }
}
