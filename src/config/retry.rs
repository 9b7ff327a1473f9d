//! Retry configuration for snapshot file operations.
//!
//! This module defines the YAML configuration format for the bounded,
//! fixed-delay retry applied to local snapshot file operations.
//!
//! Default values for max attempts and delay are sourced from `crate::constants`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{DEFAULT_FILE_OP_DELAY_MS, DEFAULT_FILE_OP_MAX_ATTEMPTS};
use crate::retry::FileRetryPolicy;

fn default_max_attempts() -> u32 {
    DEFAULT_FILE_OP_MAX_ATTEMPTS
}

fn default_delay_ms() -> u64 {
    DEFAULT_FILE_OP_DELAY_MS
}

/// Retry configuration (YAML format)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfigYaml {
    /// Total attempts per file operation (including initial attempt)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfigYaml {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl RetryConfigYaml {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        Ok(())
    }

    /// Convert to FileRetryPolicy from retry module
    pub fn to_retry_policy(&self) -> FileRetryPolicy {
        FileRetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms))
    }
}
