// Logging module for structured logging using the tracing crate

use std::error::Error;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Output format for log events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines, for terminals
    #[default]
    Text,
    /// One JSON object per event, for log aggregation
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Initialize the tracing subscriber for structured logging
///
/// The filter comes from `RUST_LOG` and falls back to
/// [`DEFAULT_LOG_FILTER`]. Events go to stdout.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
///
/// # Examples
///
/// ```
/// use listcache::logging::{init_subscriber, LogFormat};
///
/// init_subscriber(LogFormat::Text).ok();
/// tracing::info!("Application started");
/// ```
pub fn init_subscriber(format: LogFormat) -> Result<(), Box<dyn Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.with_target(false).try_init(),
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
    }
}
