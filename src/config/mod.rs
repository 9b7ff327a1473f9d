// Configuration module

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::DEFAULT_TICK_SECS;
use crate::error::{ListCacheError, Result};
use crate::retry::FileRetryPolicy;

pub mod retry;

pub use self::retry::RetryConfigYaml;

fn default_tick_seconds() -> u64 {
    DEFAULT_TICK_SECS
}

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Containers whose listings are served from a local snapshot
    pub containers: Vec<ContainerConfig>,
    /// Retry policy for local snapshot file operations
    #[serde(default)]
    pub retry: RetryConfigYaml,
    /// Scheduler wake-up period in seconds
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
}

/// Initialization fields for one cached container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub name: String,
    /// Minutes between refresh cycles, must be > 0
    pub refresh_interval_minutes: f64,
    /// Directory holding the snapshot files (default: platform temp dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,
    pub account_name: String,
    pub account_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Validated, immutable per-container cache configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub container: String,
    pub refresh_interval: Duration,
    pub storage_path: PathBuf,
    pub retry: FileRetryPolicy,
}

impl CacheConfig {
    pub fn new(
        container: impl Into<String>,
        refresh_interval: Duration,
        storage_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let container = container.into();
        if container.is_empty() {
            return Err(ListCacheError::Config(
                "container name missing from cached container config".to_string(),
            ));
        }
        if refresh_interval.is_zero() {
            return Err(ListCacheError::Config(format!(
                "refresh interval must be > 0 for container '{}'",
                container
            )));
        }
        Ok(Self {
            container,
            refresh_interval,
            storage_path: storage_path.into(),
            retry: FileRetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: FileRetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl ContainerConfig {
    pub fn validate(&self) -> Result<()> {
        // `!(x > 0.0)` also rejects NaN
        if !(self.refresh_interval_minutes > 0.0) || !self.refresh_interval_minutes.is_finite() {
            return Err(ListCacheError::Config(format!(
                "invalid refresh_interval_minutes {} on container '{}'",
                self.refresh_interval_minutes, self.name
            )));
        }
        if self.name.is_empty() {
            return Err(ListCacheError::Config(
                "container name missing from cached container config".to_string(),
            ));
        }
        if self.account_name.is_empty() {
            return Err(ListCacheError::Config(format!(
                "account_name not specified for cached container '{}'",
                self.name
            )));
        }
        if self.account_key.is_empty() {
            return Err(ListCacheError::Config(format!(
                "account_key not specified for cached container '{}'",
                self.name
            )));
        }
        Ok(())
    }

    /// Storage directory, defaulting to the platform temp dir
    pub fn storage_dir(&self) -> PathBuf {
        self.storage_path
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Validate and convert into the immutable cache configuration
    pub fn to_cache_config(&self, retry: FileRetryPolicy) -> Result<CacheConfig> {
        self.validate()?;
        let interval = Duration::try_from_secs_f64(self.refresh_interval_minutes * 60.0)
            .map_err(|e| {
                ListCacheError::Config(format!(
                    "refresh_interval_minutes out of range on container '{}': {}",
                    self.name, e
                ))
            })?;
        Ok(CacheConfig::new(&self.name, interval, self.storage_dir())?.with_retry(retry))
    }
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| ListCacheError::Config(e.to_string()))?;

        let mut missing = Vec::new();
        let substituted = re.replace_all(yaml, |caps: &regex::Captures<'_>| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    missing.push(var_name.to_string());
                    String::new()
                }
            }
        });

        if let Some(var_name) = missing.first() {
            return Err(ListCacheError::Config(format!(
                "Environment variable '{}' is referenced but not set",
                var_name
            )));
        }

        serde_yaml::from_str(&substituted).map_err(|e| ListCacheError::Config(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ListCacheError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml_with_env(&yaml)
    }

    /// File-level validation. Per-container field errors are left to
    /// initialization so that one bad container does not stop the others.
    pub fn validate(&self) -> Result<()> {
        self.retry.validate().map_err(ListCacheError::Config)?;

        if self.tick_seconds == 0 {
            return Err(ListCacheError::Config(
                "tick_seconds must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for container in &self.containers {
            if !container.name.is_empty() && !seen.insert(container.name.as_str()) {
                return Err(ListCacheError::Config(format!(
                    "Duplicate cached container '{}'",
                    container.name
                )));
            }
        }

        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }

    pub fn retry_policy(&self) -> FileRetryPolicy {
        self.retry.to_retry_policy()
    }
}
