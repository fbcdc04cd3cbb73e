//! Engine configuration
//!
//! Loaded from a JSON file; every field has a default so an empty object (or
//! no file at all) is a valid configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Public suffix list rejected: {0}")]
    PublicSuffixList(#[from] lg_core::PslError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Holds `<name>.txt` list caches and `<name>.json` metadata records
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// How often the scheduler looks for due profiles
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Interval for profiles added without one
    #[serde(default = "default_update_interval_days")]
    pub default_update_interval_days: u64,

    /// Optional Public Suffix List file for registrable-domain computation
    #[serde(default)]
    pub public_suffix_list: Option<PathBuf>,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Defaults
fn default_storage_dir() -> PathBuf {
    PathBuf::from("./filters")
}
fn default_check_interval_secs() -> u64 {
    3600
}
fn default_update_interval_days() -> u64 {
    4
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_size_bytes() -> u64 {
    16 * 1024 * 1024
}
fn default_user_agent() -> String {
    format!("ListGuard/{}", env!("CARGO_PKG_VERSION"))
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            check_interval_secs: default_check_interval_secs(),
            default_update_interval_days: default_update_interval_days(),
            public_suffix_list: None,
            fetch: FetchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_size_bytes: default_max_size_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn default_update_interval(&self) -> Duration {
        Duration::from_secs(self.default_update_interval_days.saturating_mul(24 * 60 * 60))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    /// Install the configured Public Suffix List, if any. Returns whether a
    /// list was installed by this call.
    pub fn install_public_suffix_list(&self) -> Result<bool, ConfigError> {
        let path = match &self.public_suffix_list {
            Some(path) => path,
            None => return Ok(false),
        };
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        match lg_core::install_public_suffix_list(&text) {
            Ok(()) => Ok(true),
            Err(lg_core::PslError::AlreadyInstalled) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("./filters"));
        assert_eq!(config.check_interval(), Duration::from_secs(3600));
        assert_eq!(config.default_update_interval(), Duration::from_secs(4 * 86400));
        assert_eq!(config.fetch.max_size_bytes, 16 * 1024 * 1024);
        assert_eq!(config.logging.level, "info");
        assert!(config.fetch.user_agent.starts_with("ListGuard/"));
    }

    #[test]
    fn test_huge_default_interval_saturates() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"default_update_interval_days": 18446744073709551615}"#).unwrap();
        assert_eq!(config.default_update_interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_partial_override() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"storage_dir": "/tmp/lists", "fetch": {"timeout_secs": 5}}"#).unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/lists"));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(config.fetch.max_size_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(EngineConfig::load(&missing), Err(ConfigError::Read { .. })));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(EngineConfig::load(&broken), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_no_public_suffix_list_configured() {
        assert!(!EngineConfig::default().install_public_suffix_list().unwrap());
    }
}
