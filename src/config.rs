//! Configuration loaded from `jobrelay.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! `JOBRELAY_API_KEY` and `JOBRELAY_API_URL` take precedence over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "jobrelay.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Base URL of the processing API.
    pub api_base_url: String,

    /// Bearer token for the processing API and blob storage.
    pub api_key: String,

    /// Base URL of the blob storage service. Falls back to `api_base_url`.
    pub upload_base_url: Option<String>,

    /// JSON file holding job records.
    pub store_path: PathBuf,

    /// Directory inline text targets are written to before upload.
    pub materialize_dir: PathBuf,

    /// Seconds between scheduler ticks.
    pub tick_interval_secs: u64,

    /// Attempts per remote call, including the first.
    pub max_attempts: u32,

    /// Linear backoff unit in milliseconds.
    pub retry_base_delay_ms: u64,

    /// How long a chapter request blocks repeats for the same episode.
    pub dedup_ttl_secs: u64,

    /// Registration sequences per job before a retryable error becomes
    /// terminal. Unset means no cap.
    pub max_lifecycle_attempts: Option<u32>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            api_key: String::new(),
            upload_base_url: None,
            store_path: PathBuf::from("jobrelay-jobs.json"),
            materialize_dir: PathBuf::from("jobrelay-text"),
            tick_interval_secs: 3600,
            max_attempts: 3,
            retry_base_delay_ms: 1000,
            dedup_ttl_secs: 3600,
            max_lifecycle_attempts: None,
        }
    }
}

impl RelayConfig {
    /// Load `path`, or `jobrelay.toml` in the current directory when `None`.
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("JOBRELAY_API_KEY").filter(|v| !v.is_empty()) {
            self.api_key = key;
        }
        if let Some(url) = var("JOBRELAY_API_URL").filter(|v| !v.is_empty()) {
            self.api_base_url = url;
        }
    }

    pub fn upload_base_url(&self) -> &str {
        self.upload_base_url.as_deref().unwrap_or(&self.api_base_url)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = RelayConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_base_delay_ms, 1000);
        assert_eq!(config.tick_interval(), Duration::from_secs(3600));
        assert_eq!(config.dedup_ttl(), Duration::from_secs(3600));
        assert!(config.max_lifecycle_attempts.is_none());
        assert!(config.api_key.is_empty());
        assert_eq!(config.upload_base_url(), "http://localhost:8080");
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            api_base_url = "https://graph.example.com"
            max_attempts = 5
            max_lifecycle_attempts = 10
        "#;
        let config: RelayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_base_url, "https://graph.example.com");
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.max_lifecycle_attempts, Some(10));
        assert_eq!(config.tick_interval_secs, 3600);
        assert_eq!(config.upload_base_url(), "https://graph.example.com");
    }

    #[test]
    fn retry_policy_from_config() {
        let config = RelayConfig {
            max_attempts: 4,
            retry_base_delay_ms: 250,
            ..Default::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(500));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = RelayConfig {
            api_key: "from-file".into(),
            ..Default::default()
        };
        config.apply_env(|key| match key {
            "JOBRELAY_API_KEY" => Some("from-env".into()),
            "JOBRELAY_API_URL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.api_key, "from-env");
        assert_eq!(config.api_base_url, "http://localhost:8080");
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "tick_interval_secs = 60\n").unwrap();
        let config = RelayConfig::load(Some(&path)).unwrap();
        assert_eq!(config.tick_interval(), Duration::from_secs(60));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(RelayConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
