//! Tracker configuration, persisted to disk as JSON.
//!
//! The settings UI lives outside this crate; it reads and writes the same
//! file and only ever hands the core a validated [`TrackerConfig`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{TrackerError, TrackerResult};

/// Shortest accepted sampling interval, in seconds.
pub const MIN_INTERVAL_SECS: u64 = 10;
/// Longest accepted sampling interval, in seconds.
pub const MAX_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// API key for the analysis endpoint. Empty disables analysis calls
    /// (capture and logging keep running).
    pub api_key: String,
    /// Environment variable to read the key from when `api_key` is empty
    /// (e.g. "OPENAI_API_KEY").
    pub api_key_env: Option<String>,
    /// Sampling interval in seconds. Accepted range is 10–3600.
    pub interval_secs: u64,
    /// Keep screenshot files from previous cycles instead of deleting them.
    pub keep_screenshots: bool,
    /// Base URL override for the analysis API (e.g. a local mock).
    pub api_base_url: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_key_env: None,
            interval_secs: 60,
            keep_screenshots: false,
            api_base_url: None,
        }
    }
}

impl TrackerConfig {
    /// Check the configured values against their accepted ranges.
    pub fn validate(&self) -> TrackerResult<()> {
        if self.interval_secs < MIN_INTERVAL_SECS || self.interval_secs > MAX_INTERVAL_SECS {
            return Err(TrackerError::InvalidConfig(format!(
                "interval_secs must be between {} and {}, got {}",
                MIN_INTERVAL_SECS, MAX_INTERVAL_SECS, self.interval_secs
            )));
        }
        Ok(())
    }

    /// Resolve the API key: the direct `api_key` field first, then the
    /// environment variable named in `api_key_env`. Empty means
    /// unconfigured.
    pub fn resolved_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        if let Some(ref env_var) = self.api_key_env {
            if let Ok(key) = std::env::var(env_var) {
                if !key.is_empty() {
                    return key;
                }
            }
        }
        String::new()
    }
}

/// Load config from disk. A missing or unparsable file falls back to
/// defaults; a parsed file with out-of-range values is rejected here so a
/// bad interval never reaches the scheduler.
pub fn load_config(path: &Path) -> TrackerResult<TrackerConfig> {
    let config = match std::fs::read_to_string(path) {
        Ok(json) => match serde_json::from_str::<TrackerConfig>(&json) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Failed to parse config {}: {} - using defaults", path.display(), e);
                TrackerConfig::default()
            }
        },
        Err(_) => {
            info!("No config file at {} - using defaults", path.display());
            TrackerConfig::default()
        }
    };
    config.validate()?;
    Ok(config)
}

/// Save config to disk, creating parent directories as needed.
pub fn save_config(path: &Path, config: &TrackerConfig) -> TrackerResult<()> {
    config.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| TrackerError::InvalidConfig(format!("serialize failed: {}", e)))?;
    std::fs::write(path, json)?;
    info!("Saved config to {}", path.display());
    Ok(())
}

/// Default config file location: `<config dir>/timetracker/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join("timetracker").join("config.json"))
}

/// Default output directory for screenshots and the activity log:
/// `<downloads dir>/TimeTracker`, falling back to the home directory.
pub fn default_output_dir() -> PathBuf {
    dirs_next::download_dir()
        .or_else(dirs_next::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("TimeTracker")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(TrackerConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_intervals() {
        let mut config = TrackerConfig::default();
        config.interval_secs = 9;
        assert!(config.validate().is_err());
        config.interval_secs = 3601;
        assert!(config.validate().is_err());
        config.interval_secs = 10;
        assert!(config.validate().is_ok());
        config.interval_secs = 3600;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = TrackerConfig::default();
        config.api_key = "sk-test".into();
        config.interval_secs = 120;
        config.keep_screenshots = true;
        save_config(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.api_key, "sk-test");
        assert_eq!(loaded.interval_secs, 120);
        assert!(loaded.keep_screenshots);
        assert!(loaded.api_base_url.is_none());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded.interval_secs, TrackerConfig::default().interval_secs);
    }

    #[test]
    fn load_rejects_invalid_interval_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"interval_secs": 5}"#).unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn api_key_field_wins_over_environment() {
        let mut config = TrackerConfig::default();
        config.api_key = "direct".into();
        config.api_key_env = Some("TIMETRACKER_TEST_UNSET_VAR".into());
        assert_eq!(config.resolved_api_key(), "direct");
    }

    #[test]
    fn api_key_falls_back_to_named_env_var() {
        std::env::set_var("TIMETRACKER_TEST_KEY", "sk-from-env");
        let mut config = TrackerConfig::default();
        config.api_key_env = Some("TIMETRACKER_TEST_KEY".into());
        assert_eq!(config.resolved_api_key(), "sk-from-env");
    }

    #[test]
    fn unresolvable_key_is_empty() {
        let mut config = TrackerConfig::default();
        config.api_key_env = Some("TIMETRACKER_TEST_NEVER_SET".into());
        assert_eq!(config.resolved_api_key(), "");
    }
}
